//! Shared constants used across the application.

/// User agent string used for the browser session.
///
/// A current desktop Chrome UA; the headless default announces itself as
/// `HeadlessChrome`, which X serves a degraded page to.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Canonical site origin. All thread URLs are normalized onto it.
pub const SITE_ORIGIN: &str = "https://x.com";

/// Cookie domain for the session cookies.
pub const COOKIE_DOMAIN: &str = ".x.com";

/// Page used to check that the injected session is logged in.
pub const SESSION_CHECK_URL: &str = "https://x.com/home";
