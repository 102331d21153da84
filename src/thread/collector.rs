//! Scroll-until-stable thread collection.

use std::collections::HashSet;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::{pin_mut, Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info};

use super::ScannedPost;
use crate::config::{Config, ThreadScope};
use crate::error::ScrapeError;
use crate::x::{scan_page, PageScan};

/// A rendered thread page the collector can drive.
#[async_trait]
pub trait ThreadSurface: Send {
    /// Put the page back in its freshly loaded state.
    async fn rewind(&mut self) -> Result<(), ScrapeError>;

    /// Rendered HTML as it is right now.
    async fn snapshot(&mut self) -> Result<String, ScrapeError>;

    /// Scroll and expand to reveal more posts, then wait for them to settle.
    async fn advance(&mut self) -> Result<(), ScrapeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorLimits {
    /// Maximum number of advances.
    pub max_scrolls: usize,
    /// Consecutive advances without a new post id before giving up.
    pub max_idle_rounds: usize,
    /// Wall-clock cap for the whole collection.
    pub budget: Duration,
}

impl CollectorLimits {
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            max_scrolls: config.max_scrolls,
            max_idle_rounds: config.max_idle_rounds,
            budget: config.collect_budget,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A post by someone else ended the author's chain.
    ChainEnded,
    /// No new post ids for `max_idle_rounds` advances.
    Settled,
    MaxScrolls,
    Budget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub scans: usize,
    pub advances: usize,
    /// Sightings of a post id that was already collected or rejected.
    pub repeat_sightings: usize,
    /// Posts rendered above the root.
    pub ancestors: usize,
    /// Posts by other authors, or by the author outside the chain.
    pub outside_thread: usize,
    pub promoted: usize,
    pub stop: StopReason,
}

enum Step {
    Post(ScannedPost),
    Done(CollectStats),
}

/// Collects the posts of one thread from a [`ThreadSurface`].
#[derive(Debug, Clone)]
pub struct Collector {
    root_id: String,
    scope: ThreadScope,
    limits: CollectorLimits,
}

impl Collector {
    #[must_use]
    pub fn new(root_id: impl Into<String>, scope: ThreadScope, limits: CollectorLimits) -> Self {
        Self {
            root_id: root_id.into(),
            scope,
            limits,
        }
    }

    /// Lazily stream thread posts in first-seen order.
    ///
    /// Each call starts over from a rewound page; an interrupted stream
    /// cannot be resumed.
    pub fn posts<'a, S: ThreadSurface>(
        &'a self,
        surface: &'a mut S,
    ) -> impl Stream<Item = Result<ScannedPost, ScrapeError>> + 'a {
        self.steps(surface).filter_map(|step| async move {
            match step {
                Ok(Step::Post(post)) => Some(Ok(post)),
                Ok(Step::Done(_)) => None,
                Err(e) => Some(Err(e)),
            }
        })
    }

    /// Collect the whole thread.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::EmptyThread`] if the root post is not readable, or any
    /// fatal error raised by the surface.
    pub async fn collect<S: ThreadSurface>(
        &self,
        surface: &mut S,
    ) -> Result<(Vec<ScannedPost>, CollectStats), ScrapeError> {
        let steps = self.steps(surface);
        pin_mut!(steps);

        let mut posts = Vec::new();
        while let Some(step) = steps.next().await {
            match step? {
                Step::Post(post) => posts.push(post),
                Step::Done(stats) => {
                    info!(
                        posts = posts.len(),
                        scans = stats.scans,
                        advances = stats.advances,
                        stop = ?stats.stop,
                        "Thread collection finished"
                    );
                    return Ok((posts, stats));
                }
            }
        }

        Err(ScrapeError::Browser(
            "thread collection ended without a result".to_string(),
        ))
    }

    fn steps<'a, S: ThreadSurface>(
        &'a self,
        surface: &'a mut S,
    ) -> impl Stream<Item = Result<Step, ScrapeError>> + 'a {
        try_stream! {
            let started = Instant::now();
            surface.rewind().await?;

            let mut acc = Accumulator::new(&self.root_id, self.scope);
            let mut idle_rounds = 0;
            let mut advances = 0;

            loop {
                let html = surface.snapshot().await?;
                let scan = scan_page(&html);
                let absorbed = acc.absorb(&scan)?;

                if advances > 0 {
                    if absorbed.new_ids == 0 {
                        idle_rounds += 1;
                    } else {
                        idle_rounds = 0;
                    }
                }
                debug!(
                    scan = acc.stats.scans,
                    new_ids = absorbed.new_ids,
                    accepted = absorbed.accepted.len(),
                    idle_rounds,
                    "Scanned thread page"
                );

                for post in absorbed.accepted {
                    yield Step::Post(post);
                }

                let stop = if self.scope == ThreadScope::Chain && acc.chain_closed {
                    Some(StopReason::ChainEnded)
                } else if idle_rounds >= self.limits.max_idle_rounds {
                    Some(StopReason::Settled)
                } else if advances >= self.limits.max_scrolls {
                    Some(StopReason::MaxScrolls)
                } else if started.elapsed() >= self.limits.budget {
                    Some(StopReason::Budget)
                } else {
                    None
                };

                if let Some(stop) = stop {
                    yield Step::Done(acc.finish(advances, stop));
                    break;
                }

                surface.advance().await?;
                advances += 1;
            }
        }
    }
}

struct Absorbed {
    /// Ids never observed before, any author.
    new_ids: usize,
    accepted: Vec<ScannedPost>,
}

/// Per-run bookkeeping across page scans.
struct Accumulator<'a> {
    root_id: &'a str,
    scope: ThreadScope,
    root_author: Option<String>,
    observed: HashSet<String>,
    chain_closed: bool,
    stats: CollectStats,
}

impl<'a> Accumulator<'a> {
    fn new(root_id: &'a str, scope: ThreadScope) -> Self {
        Self {
            root_id,
            scope,
            root_author: None,
            observed: HashSet::new(),
            chain_closed: false,
            stats: CollectStats {
                scans: 0,
                advances: 0,
                repeat_sightings: 0,
                ancestors: 0,
                outside_thread: 0,
                promoted: 0,
                stop: StopReason::Settled,
            },
        }
    }

    fn absorb(&mut self, scan: &PageScan) -> Result<Absorbed, ScrapeError> {
        self.stats.scans += 1;
        self.stats.promoted += scan.promoted;

        let root_pos = scan.position_of(self.root_id);

        let root_author = match (self.root_author.clone(), root_pos) {
            (Some(author), _) => author,
            (None, Some(pos)) => {
                let author = scan.posts[pos].author.clone();
                for ancestor in &scan.posts[..pos] {
                    if self.observed.insert(ancestor.id.clone()) {
                        self.stats.ancestors += 1;
                    }
                }
                self.root_author = Some(author.clone());
                author
            }
            (None, None) => {
                let reason = scan.tombstone.map_or_else(
                    || format!("root post {} is not readable", self.root_id),
                    |t| format!("root post {}: {}", self.root_id, t.describe()),
                );
                return Err(ScrapeError::EmptyThread(reason));
            }
        };

        let start = root_pos.unwrap_or(0);
        let mut absorbed = Absorbed {
            new_ids: 0,
            accepted: Vec::new(),
        };

        for post in &scan.posts[start..] {
            if !self.observed.insert(post.id.clone()) {
                self.stats.repeat_sightings += 1;
                continue;
            }
            absorbed.new_ids += 1;

            if self.chain_closed {
                self.stats.outside_thread += 1;
                continue;
            }
            if !post.author.eq_ignore_ascii_case(&root_author) {
                self.stats.outside_thread += 1;
                if self.scope == ThreadScope::Chain {
                    self.chain_closed = true;
                }
                continue;
            }
            absorbed.accepted.push(post.clone());
        }

        Ok(absorbed)
    }

    fn finish(&self, advances: usize, stop: StopReason) -> CollectStats {
        CollectStats {
            advances,
            stop,
            ..self.stats
        }
    }
}
