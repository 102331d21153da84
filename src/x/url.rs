use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::constants::SITE_ORIGIN;

static HOST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^((www|mobile)\.)?(twitter|x)\.com$").unwrap());

/// Relative permalink of a post: `/{handle}/status/{id}`, nothing after it.
static PERMALINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_]{1,50})/status/(\d+)/?$").unwrap());

static STATUS_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,25}$").unwrap());

/// A parsed thread URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUrl {
    /// Author handle, absent for `/i/web/status/{id}` links.
    pub handle: Option<String>,
    pub status_id: String,
}

impl StatusUrl {
    /// Parse a status URL in any of the site's shapes.
    ///
    /// Accepts `twitter.com`, `x.com`, and their `www.`/`mobile.` variants,
    /// with or without trailing segments (`/photo/1`) and query strings.
    pub fn parse(input: &str) -> Result<Self, String> {
        let parsed = Url::parse(input.trim()).map_err(|e| format!("'{input}' is not a URL: {e}"))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(format!("'{input}' is not an http(s) URL"));
        }

        let host = parsed
            .host_str()
            .map(str::to_lowercase)
            .ok_or_else(|| format!("'{input}' has no host"))?;
        if !HOST_PATTERN.is_match(&host) {
            return Err(format!("'{host}' is not an X/Twitter host"));
        }

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let (handle, status_id) = match segments.as_slice() {
            ["i", "web", "status", id, ..] | ["i", "status", id, ..] => (None, *id),
            [handle, "status" | "statuses", id, ..] => (Some((*handle).to_string()), *id),
            _ => return Err(format!("'{input}' is not a status URL")),
        };

        if !STATUS_ID_PATTERN.is_match(status_id) {
            return Err(format!("'{status_id}' is not a status id"));
        }

        Ok(Self {
            handle,
            status_id: status_id.to_string(),
        })
    }

    /// Canonical `https://x.com/...` form, without tracking parameters.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self.handle {
            Some(ref handle) => format!("{SITE_ORIGIN}/{handle}/status/{}", self.status_id),
            None => format!("{SITE_ORIGIN}/i/web/status/{}", self.status_id),
        }
    }
}

impl fmt::Display for StatusUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Split a post permalink href into `(handle, status_id)`.
///
/// Only bare permalinks match; `/analytics`, `/photo/1`, `/likes` etc. do not.
#[must_use]
pub fn split_permalink(href: &str) -> Option<(String, String)> {
    let path = href
        .strip_prefix(SITE_ORIGIN)
        .or_else(|| href.strip_prefix("https://twitter.com"))
        .unwrap_or(href);
    let path = path.split(['?', '#']).next().unwrap_or(path);

    PERMALINK_PATTERN
        .captures(path)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// Whether a page URL is one of X's sign-in or sign-out flows.
///
/// A session whose cookies were rejected lands on one of these.
#[must_use]
pub fn is_login_redirect(page_url: &str) -> bool {
    let Ok(parsed) = Url::parse(page_url) else {
        return false;
    };
    let on_site = parsed
        .host_str()
        .is_some_and(|host| HOST_PATTERN.is_match(host));
    let path = parsed.path().trim_end_matches('/');
    on_site
        && (path == "/login"
            || path == "/logout"
            || path.starts_with("/i/flow/login")
            || path.starts_with("/i/flow/signup")
            || path == "/account/access")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_variants() {
        for url in [
            "https://twitter.com/naval/status/123",
            "https://www.twitter.com/naval/status/123",
            "https://x.com/naval/status/123",
            "https://www.x.com/naval/status/123",
            "https://mobile.twitter.com/naval/status/123",
            "https://mobile.x.com/naval/status/123",
            "http://x.com/naval/status/123",
        ] {
            let parsed = StatusUrl::parse(url).unwrap();
            assert_eq!(parsed.handle.as_deref(), Some("naval"), "{url}");
            assert_eq!(parsed.status_id, "123", "{url}");
        }
    }

    #[test]
    fn test_parse_strips_trailing_segments_and_query() {
        let parsed = StatusUrl::parse("https://x.com/naval/status/1234567890/photo/1?s=20&t=abc").unwrap();
        assert_eq!(parsed.canonical(), "https://x.com/naval/status/1234567890");
    }

    #[test]
    fn test_parse_web_status() {
        let parsed = StatusUrl::parse("https://twitter.com/i/web/status/987").unwrap();
        assert_eq!(parsed.handle, None);
        assert_eq!(parsed.canonical(), "https://x.com/i/web/status/987");
    }

    #[test]
    fn test_parse_rejects_non_status_urls() {
        assert!(StatusUrl::parse("https://x.com/naval").is_err());
        assert!(StatusUrl::parse("https://x.com/").is_err());
        assert!(StatusUrl::parse("https://example.com/naval/status/123").is_err());
        assert!(StatusUrl::parse("https://x.com/naval/status/abc").is_err());
        assert!(StatusUrl::parse("ftp://x.com/naval/status/123").is_err());
        assert!(StatusUrl::parse("not a url").is_err());
    }

    #[test]
    fn test_split_permalink() {
        assert_eq!(
            split_permalink("/naval/status/42"),
            Some(("naval".to_string(), "42".to_string()))
        );
        assert_eq!(
            split_permalink("https://x.com/naval/status/42?s=20"),
            Some(("naval".to_string(), "42".to_string()))
        );
        assert_eq!(split_permalink("/naval/status/42/analytics"), None);
        assert_eq!(split_permalink("/naval/status/42/photo/1"), None);
        assert_eq!(split_permalink("/naval"), None);
    }

    #[test]
    fn test_is_login_redirect() {
        assert!(is_login_redirect("https://x.com/i/flow/login?redirect_after_login=%2Fhome"));
        assert!(is_login_redirect("https://twitter.com/login"));
        assert!(is_login_redirect("https://x.com/logout/"));
        assert!(!is_login_redirect("https://x.com/home"));
        assert!(!is_login_redirect("https://x.com/login_help/status/1"));
        assert!(!is_login_redirect("https://example.com/login"));
        assert!(!is_login_redirect("about:blank"));
    }
}
