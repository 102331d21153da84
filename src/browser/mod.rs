//! Headless Chromium session carrying the user's X cookies.
//!
//! [`BrowserSession`] owns the browser process and its CDP handler task.
//! It must be closed with [`BrowserSession::close`] on every exit path.

mod page;

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use page::LivePage;

use crate::config::Config;
use crate::constants::{BROWSER_USER_AGENT, COOKIE_DOMAIN, SESSION_CHECK_URL, SITE_ORIGIN};
use crate::error::ScrapeError;
use crate::x::is_login_redirect;

/// A running browser with an authenticated X session.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch Chromium according to the browser settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Browser`] if the browser cannot be started.
    pub async fn launch(config: &Config) -> Result<Self, ScrapeError> {
        info!(
            headless = config.headless,
            proxy = config.proxy.is_some(),
            "Launching browser"
        );

        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.page_timeout)
            .no_sandbox()
            .disable_default_args()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--mute-audio")
            .arg(format!("--user-agent={BROWSER_USER_AGENT}"))
            .arg("--lang=en-US");

        if config.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        if let Some(ref chrome_path) = config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScrapeError::browser("failed to build browser config", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::browser("failed to launch browser", e))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        info!("Browser launched");
        Ok(Self { browser, handler })
    }

    /// Open a tab carrying the session cookies and confirm X accepts them.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Auth`] if X bounces the session to a login
    /// flow, and [`ScrapeError::Browser`] if the tab cannot be prepared.
    pub async fn authenticate(&self, config: &Config) -> Result<Page, ScrapeError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::browser("failed to open tab", e))?;

        if let Err(e) = prepare_page(&page, config).await {
            close_page(page).await;
            return Err(e);
        }

        match verify_session(&page, config.page_timeout).await {
            Ok(()) => {
                info!("Session accepted");
                Ok(page)
            }
            Err(e) => {
                close_page(page).await;
                Err(e)
            }
        }
    }

    /// Shut the browser down and stop its handler task.
    pub async fn close(mut self) {
        match self.browser.close().await {
            Ok(_) => {
                if let Err(e) = self.browser.wait().await {
                    debug!("Browser process did not exit cleanly: {e}");
                }
                info!("Browser shutdown complete");
            }
            Err(e) => {
                error!("Failed to close browser: {e}");
                if let Err(e) = self.browser.kill().await.transpose() {
                    warn!("Failed to kill browser process: {e}");
                }
            }
        }
        self.handler.abort();
    }
}

async fn prepare_page(page: &Page, config: &Config) -> Result<(), ScrapeError> {
    page.execute(SetTimezoneOverrideParams::new(config.timezone.clone()))
        .await
        .map_err(|e| ScrapeError::browser("failed to override timezone", e))?;

    page.set_cookies(session_cookies(config)?)
        .await
        .map_err(|e| ScrapeError::browser("failed to set session cookies", e))?;

    debug!(timezone = %config.timezone, "Tab prepared");
    Ok(())
}

async fn verify_session(page: &Page, timeout: Duration) -> Result<(), ScrapeError> {
    debug!(url = SESSION_CHECK_URL, "Verifying session");

    within(timeout, "loading the session check page", page.goto(SESSION_CHECK_URL)).await?;

    // The redirect to the login flow happens client-side after load.
    let deadline = tokio::time::Instant::now() + timeout.min(Duration::from_secs(5));
    loop {
        let url = page
            .url()
            .await
            .map_err(|e| ScrapeError::browser("failed to read page url", e))?
            .unwrap_or_default();
        if is_login_redirect(&url) {
            return Err(ScrapeError::Auth(
                "session cookies were rejected (redirected to login)".to_string(),
            ));
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Run one browser step under a deadline.
///
/// Running out of time is a [`ScrapeError::Navigation`]; a CDP failure is a
/// [`ScrapeError::Browser`].
pub(crate) async fn within<T, E, F>(timeout: Duration, step: &str, fut: F) -> Result<T, ScrapeError>
where
    E: std::fmt::Display,
    F: std::future::Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ScrapeError::browser(&format!("failed {step}"), e)),
        Err(_) => Err(ScrapeError::Navigation(format!(
            "timed out after {}s {step}",
            timeout.as_secs_f32()
        ))),
    }
}

pub(crate) async fn close_page(page: Page) {
    if let Err(e) = page.close().await {
        warn!("Failed to close page: {e}");
    }
}

/// Cookies injected before the first navigation.
///
/// Each cookie carries an explicit URL because the tab is still on
/// `about:blank` when they are set.
///
/// The token's shape is checked before the browser is launched, not here.
///
/// # Errors
///
/// Returns [`ScrapeError::Browser`] if a cookie cannot be built.
pub fn session_cookies(config: &Config) -> Result<Vec<CookieParam>, ScrapeError> {
    let mut cookies = vec![cookie("auth_token", config.auth_token.trim(), true)?];
    if let Some(ref ct0) = config.ct0 {
        cookies.push(cookie("ct0", ct0, false)?);
    }
    if let Some(ref twid) = config.twid {
        cookies.push(cookie("twid", twid, false)?);
    }
    Ok(cookies)
}

fn cookie(name: &str, value: &str, http_only: bool) -> Result<CookieParam, ScrapeError> {
    CookieParam::builder()
        .name(name)
        .value(value)
        .url(SITE_ORIGIN)
        .domain(COOKIE_DOMAIN)
        .path("/")
        .secure(true)
        .http_only(http_only)
        .build()
        .map_err(|e| ScrapeError::browser("failed to build cookie", e))
}
