//! One scrape run, from a thread URL to files on disk.

use std::fmt;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::browser::{BrowserSession, LivePage};
use crate::config::Config;
use crate::error::{ScrapeError, UnresolvedMedia};
use crate::media::{MediaCatalog, MediaResolver};
use crate::thread::{CollectStats, Collector, CollectorLimits, Post, ScannedPost, Thread};
use crate::writer;
use crate::x::StatusUrl;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Authenticated,
    Navigated,
    Collecting,
    Resolving,
    Writing,
    Done,
    Failed,
}

impl RunState {
    /// The state that follows on success, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Authenticated),
            Self::Authenticated => Some(Self::Navigated),
            Self::Navigated => Some(Self::Collecting),
            Self::Collecting => Some(Self::Resolving),
            Self::Resolving => Some(Self::Writing),
            Self::Writing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Authenticated => "authenticated",
            Self::Navigated => "navigated",
            Self::Collecting => "collecting",
            Self::Resolving => "resolving",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and logs state transitions for a run.
#[derive(Debug)]
pub struct RunTracker {
    state: RunState,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RunState::Init,
        }
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Move to `to`. Only the successor of the current state is accepted;
    /// anything else leaves the tracker unchanged and returns `false`.
    pub fn advance(&mut self, to: RunState) -> bool {
        if self.state.next() != Some(to) {
            warn!(from = %self.state, to = %to, "Ignoring out-of-order state transition");
            return false;
        }
        info!(from = %self.state, to = %to, "Run state changed");
        self.state = to;
        true
    }

    /// Enter `Failed` from any non-terminal state.
    pub fn fail(&mut self, err: &ScrapeError) {
        if self.state.is_terminal() {
            return;
        }
        error!(from = %self.state, exit_code = err.exit_code(), "Run failed: {err}");
        self.state = RunState::Failed;
    }
}

/// What to scrape and where to put it.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub thread_url: String,
    pub output: PathBuf,
    pub markdown: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunReport {
    pub thread: Thread,
    pub unresolved: Vec<UnresolvedMedia>,
    pub stats: CollectStats,
}

/// Scrape one thread and write it out.
///
/// # Errors
///
/// Any fatal [`ScrapeError`]. The browser is closed and no output file is
/// left behind.
pub async fn run(config: &Config, request: &ScrapeRequest) -> Result<RunReport, ScrapeError> {
    let mut tracker = RunTracker::new();
    let result = run_tracked(config, request, &mut tracker).await;
    if let Err(ref e) = result {
        tracker.fail(e);
    }
    result
}

async fn run_tracked(
    config: &Config,
    request: &ScrapeRequest,
    tracker: &mut RunTracker,
) -> Result<RunReport, ScrapeError> {
    if !config.token_is_well_formed() {
        return Err(ScrapeError::Auth(
            "X_AUTH_TOKEN is not a 40 character hex token".to_string(),
        ));
    }
    let target = StatusUrl::parse(&request.thread_url).map_err(ScrapeError::Navigation)?;
    info!(url = %target, root_id = %target.status_id, "Scraping thread");

    let session = BrowserSession::launch(config).await?;
    let scraped = scrape(&session, &target, config, tracker).await;
    session.close().await;
    let (scanned, stats, catalog) = scraped?;

    tracker.advance(RunState::Resolving);
    let (thread, unresolved) = assemble_thread(&target.status_id, scanned, &catalog, config);
    for issue in &unresolved {
        warn!("{issue}");
    }

    tracker.advance(RunState::Writing);
    write_outputs(request, &target.canonical(), thread.posts())?;
    info!(
        posts = thread.len(),
        unresolved = unresolved.len(),
        output = %request.output.display(),
        "Thread written"
    );

    tracker.advance(RunState::Done);
    Ok(RunReport {
        thread,
        unresolved,
        stats,
    })
}

/// Browser-bound part of the run. The caller closes the session.
async fn scrape(
    session: &BrowserSession,
    target: &StatusUrl,
    config: &Config,
    tracker: &mut RunTracker,
) -> Result<(Vec<ScannedPost>, CollectStats, MediaCatalog), ScrapeError> {
    let page = session.authenticate(config).await?;
    tracker.advance(RunState::Authenticated);

    let mut live = LivePage::open(page, target, config).await?;
    tracker.advance(RunState::Navigated);

    tracker.advance(RunState::Collecting);
    let collector = Collector::new(
        target.status_id.clone(),
        config.thread_scope,
        CollectorLimits::from_config(config),
    );
    match collector.collect(&mut live).await {
        Ok((scanned, stats)) => {
            let catalog = live.finish().await;
            Ok((scanned, stats, catalog))
        }
        Err(e) => {
            live.abandon().await;
            Err(e)
        }
    }
}

/// Write the JSON file and any requested exports, all or none of them.
///
/// # Errors
///
/// Returns [`ScrapeError::Write`] if any file cannot be written. No output
/// file exists afterwards in that case.
pub fn write_outputs(request: &ScrapeRequest, thread_url: &str, posts: &[Post]) -> Result<(), ScrapeError> {
    let mut batch = writer::Batch::new();
    batch.json(&request.output, posts)?;
    if let Some(ref md) = request.markdown {
        batch.markdown(md, thread_url, posts);
    }
    if let Some(ref csv) = request.csv {
        batch.csv(csv, thread_url, posts)?;
    }
    batch.commit()
}

/// Resolve media and assemble the ordered thread.
#[must_use]
pub fn assemble_thread(
    root_id: &str,
    scanned: Vec<ScannedPost>,
    catalog: &MediaCatalog,
    config: &Config,
) -> (Thread, Vec<UnresolvedMedia>) {
    let resolver = MediaResolver::new(catalog, config.video_mode);
    let mut thread = Thread::new(root_id);
    let mut unresolved = Vec::new();

    for post in scanned {
        let (media, failed) = resolver.resolve_post(&post);
        unresolved.extend(failed);
        thread.push(Post::from_scanned(post, media));
    }

    (thread, unresolved)
}
