//! The live thread tab: navigation, scrolling and network harvesting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures_util::{FutureExt, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{close_page, within};
use crate::config::Config;
use crate::error::ScrapeError;
use crate::media::MediaCatalog;
use crate::thread::ThreadSurface;
use crate::x::variants::is_post_payload;
use crate::x::{is_login_redirect, scan_page, PageScan, StatusUrl};

/// Scrolls one viewport and expands collapsed reply branches.
///
/// The "Show more" link inside long posts opens the post page, so only the
/// reply-branch buttons are clicked.
const ADVANCE_SCRIPT: &str = r#"
(() => {
  let expanded = 0;
  for (const el of document.querySelectorAll('main [role="button"], main button')) {
    const label = (el.innerText || '').trim().toLowerCase();
    if (label === 'show replies' || label === 'show more replies' || label.startsWith('show additional replies')) {
      el.click();
      expanded += 1;
    }
  }
  window.scrollBy(0, Math.max(window.innerHeight * 0.9, 800));
  return expanded;
})()
"#;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Payload bodies are not always available the instant the response header
/// arrives; give up on one after this many attempts.
const BODY_ATTEMPTS: u8 = 3;

/// A thread page open in the browser, driven by the collector.
pub struct LivePage {
    page: Page,
    url: String,
    timeout: Duration,
    settle: Duration,
    responses: EventStream<EventResponseReceived>,
    pending_bodies: Vec<(RequestId, u8)>,
    catalog: MediaCatalog,
    /// No advance since the last load.
    fresh: bool,
}

impl LivePage {
    /// Navigate an authenticated tab to the thread and wait for it to render.
    ///
    /// A rendered tombstone for the root is not an error here; the collector
    /// reports it as an empty thread.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::Navigation`] if the page does not exist or never renders.
    /// - [`ScrapeError::Auth`] if X shows a login wall instead of the thread.
    pub async fn open(page: Page, target: &StatusUrl, config: &Config) -> Result<Self, ScrapeError> {
        let responses = match page.event_listener::<EventResponseReceived>().await {
            Ok(stream) => stream,
            Err(e) => {
                close_page(page).await;
                return Err(ScrapeError::browser("failed to subscribe to network events", e));
            }
        };

        let mut live = Self {
            page,
            url: target.canonical(),
            timeout: config.page_timeout,
            settle: config.scroll_pause,
            responses,
            pending_bodies: Vec::new(),
            catalog: MediaCatalog::new(),
            fresh: false,
        };

        info!(url = %live.url, "Opening thread");
        match live.load().await {
            Ok(()) => Ok(live),
            Err(e) => {
                close_page(live.page).await;
                Err(e)
            }
        }
    }

    async fn load(&mut self) -> Result<(), ScrapeError> {
        match tokio::time::timeout(self.timeout, self.page.goto(self.url.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(ScrapeError::Navigation(format!("failed to load {}: {e}", self.url)))
            }
            Err(_) => {
                return Err(ScrapeError::Navigation(format!(
                    "{} did not load within {}s",
                    self.url,
                    self.timeout.as_secs()
                )))
            }
        }

        let scan = self.wait_for_render().await?;
        if scan.missing_page {
            return Err(ScrapeError::Navigation(format!("{} does not exist", self.url)));
        }
        if scan.login_wall {
            return Err(ScrapeError::Auth(
                "X asked for a login instead of rendering the thread".to_string(),
            ));
        }

        debug!(posts = scan.posts.len(), tombstone = ?scan.tombstone, "Thread rendered");
        self.fresh = true;
        self.harvest().await;
        Ok(())
    }

    /// Poll the DOM until posts, a tombstone, or an error page shows up.
    async fn wait_for_render(&mut self) -> Result<PageScan, ScrapeError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let current = self
                .page
                .url()
                .await
                .map_err(|e| ScrapeError::browser("failed to read page url", e))?
                .unwrap_or_default();
            if is_login_redirect(&current) {
                return Err(ScrapeError::Auth(
                    "redirected to login while opening the thread".to_string(),
                ));
            }

            let scan = scan_page(&self.html().await?);
            if scan.has_content() || scan.missing_page || scan.login_wall {
                return Ok(scan);
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::Navigation(format!(
                    "{} rendered no posts within {}s",
                    self.url,
                    self.timeout.as_secs()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn html(&self) -> Result<String, ScrapeError> {
        within(self.timeout, "reading page content", self.page.content()).await
    }

    /// Drain network events seen so far into the media catalog.
    async fn harvest(&mut self) {
        let mut seen = 0usize;
        while let Some(Some(event)) = self.responses.next().now_or_never() {
            seen += 1;
            self.observe(&event);
        }

        let pending = std::mem::take(&mut self.pending_bodies);
        for (request_id, attempts) in pending {
            let params = GetResponseBodyParams::new(request_id.clone());
            match self.page.execute(params).await {
                Ok(response) if response.result.base64_encoded => {
                    debug!("Skipping base64-encoded payload body");
                }
                Ok(response) => match serde_json::from_str(&response.result.body) {
                    Ok(payload) => self.catalog.observe_payload(&payload),
                    Err(e) => debug!("Payload body is not JSON: {e}"),
                },
                Err(e) if attempts + 1 < BODY_ATTEMPTS => {
                    debug!("Payload body not ready yet: {e}");
                    self.pending_bodies.push((request_id, attempts + 1));
                }
                Err(e) => warn!("Giving up on payload body: {e}"),
            }
        }

        if seen > 0 {
            debug!(responses = seen, media = self.catalog.len(), "Harvested network responses");
        }
    }

    fn observe(&mut self, event: &Arc<EventResponseReceived>) {
        let url = event.response.url.as_str();
        self.catalog.observe_url(url);
        if is_post_payload(url) {
            self.pending_bodies.push((event.request_id.clone(), 0));
        }
    }

    /// Final harvest, then close the tab and hand back what was observed.
    pub async fn finish(mut self) -> MediaCatalog {
        self.harvest().await;
        // One more pass for bodies that were not ready on the first try.
        if !self.pending_bodies.is_empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
            self.harvest().await;
        }
        close_page(self.page).await;
        info!(videos = self.catalog.len(), "Media catalog complete");
        self.catalog
    }

    /// Close the tab without a final harvest.
    pub async fn abandon(self) {
        close_page(self.page).await;
    }
}

#[async_trait]
impl ThreadSurface for LivePage {
    async fn rewind(&mut self) -> Result<(), ScrapeError> {
        if self.fresh {
            return Ok(());
        }
        debug!(url = %self.url, "Reloading thread");
        self.load().await
    }

    async fn snapshot(&mut self) -> Result<String, ScrapeError> {
        self.html().await
    }

    async fn advance(&mut self) -> Result<(), ScrapeError> {
        self.fresh = false;
        let expanded = within(self.timeout, "scrolling", self.page.evaluate(ADVANCE_SCRIPT))
            .await?
            .into_value::<u32>()
            .unwrap_or(0);
        if expanded > 0 {
            debug!(expanded, "Expanded reply branches");
        }

        tokio::time::sleep(self.settle).await;
        self.harvest().await;
        Ok(())
    }
}
