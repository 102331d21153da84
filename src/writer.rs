//! Output files.
//!
//! The files of a run are rendered into a [`Batch`], staged as temporary
//! siblings of their targets and only renamed into place once every one of
//! them is on disk. A failed run never leaves a partial or lone file behind.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::ScrapeError;
use crate::thread::{MediaKind, Post};

/// Output files rendered in memory, written all-or-nothing by [`Batch::commit`].
#[derive(Debug, Default)]
pub struct Batch {
    files: Vec<(PathBuf, Vec<u8>)>,
}

impl Batch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the posts as a pretty-printed JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Write`] if the posts cannot be serialized.
    pub fn json(&mut self, path: &Path, posts: &[Post]) -> Result<(), ScrapeError> {
        let mut body = serde_json::to_vec_pretty(posts).map_err(|e| write_error(path, e.into()))?;
        body.push(b'\n');
        self.files.push((path.to_path_buf(), body));
        Ok(())
    }

    /// Add a readable Markdown rendition of the thread.
    pub fn markdown(&mut self, path: &Path, thread_url: &str, posts: &[Post]) {
        self.files
            .push((path.to_path_buf(), render_markdown(thread_url, posts).into_bytes()));
    }

    /// Add one CSV row per post.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Write`] if a row cannot be encoded.
    pub fn csv(&mut self, path: &Path, thread_url: &str, posts: &[Post]) -> Result<(), ScrapeError> {
        let body = render_csv(thread_url, posts).map_err(|e| write_error(path, e))?;
        self.files.push((path.to_path_buf(), body));
        Ok(())
    }

    /// Write every file or none of them.
    ///
    /// All files are staged next to their targets first. Files already moved
    /// into place are removed again if a later one cannot be.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Write`] for the first file that could not be
    /// staged or moved into place.
    pub fn commit(self) -> Result<(), ScrapeError> {
        let mut staged = Vec::with_capacity(self.files.len());
        for (path, contents) in self.files {
            let file = stage(&path, &contents)?;
            staged.push((path, file, contents.len()));
        }

        let mut placed: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (path, file, bytes) in staged {
            if let Err(e) = file.persist(&path) {
                roll_back(&placed);
                return Err(write_error(&path, e.error));
            }
            debug!(path = %path.display(), bytes, "Wrote output file");
            placed.push(path);
        }
        Ok(())
    }
}

/// Write posts as a pretty-printed JSON array.
///
/// # Errors
///
/// Returns [`ScrapeError::Write`] if the file cannot be created or renamed.
pub fn write_json(path: &Path, posts: &[Post]) -> Result<(), ScrapeError> {
    let mut batch = Batch::new();
    batch.json(path, posts)?;
    batch.commit()
}

/// Write a readable Markdown rendition of the thread.
///
/// # Errors
///
/// Returns [`ScrapeError::Write`] if the file cannot be created or renamed.
pub fn write_markdown(path: &Path, thread_url: &str, posts: &[Post]) -> Result<(), ScrapeError> {
    let mut batch = Batch::new();
    batch.markdown(path, thread_url, posts);
    batch.commit()
}

#[must_use]
pub fn render_markdown(thread_url: &str, posts: &[Post]) -> String {
    let mut out = format!("# Thread: {thread_url}\n");

    for post in posts {
        let name = post.display_name.as_deref().unwrap_or(&post.author);
        let when = post
            .timestamp
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "unknown time".to_string());

        let _ = write!(out, "\n---\n\n**{name}** (@{}) – {when}\n\n{}\n", post.author, post.text);
        for media in &post.media {
            let label = match media.kind {
                MediaKind::Image => "image",
                MediaKind::Video => "video",
            };
            let _ = write!(out, "\n- [{label}]({})", media.url);
        }
        if !post.media.is_empty() {
            out.push('\n');
        }
    }

    out
}

/// One flat CSV record. Media URLs are joined with a single space.
#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    author: &'a str,
    display_name: &'a str,
    text: &'a str,
    timestamp: String,
    likes: u64,
    reposts: u64,
    replies: u64,
    views: u64,
    media: String,
    thread_url: &'a str,
}

impl<'a> CsvRow<'a> {
    fn new(thread_url: &'a str, post: &'a Post) -> Self {
        Self {
            id: &post.id,
            author: &post.author,
            display_name: post.display_name.as_deref().unwrap_or_default(),
            text: &post.text,
            timestamp: post.timestamp.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
            likes: post.counters.likes,
            reposts: post.counters.reposts,
            replies: post.counters.replies,
            views: post.counters.views,
            media: post
                .media
                .iter()
                .map(|m| m.url.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            thread_url,
        }
    }
}

/// Render posts as CSV with a header row.
///
/// # Errors
///
/// Returns the underlying I/O error if a record cannot be encoded.
pub fn render_csv(thread_url: &str, posts: &[Post]) -> io::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for post in posts {
        writer.serialize(CsvRow::new(thread_url, post))?;
    }
    writer.into_inner().map_err(csv::IntoInnerError::into_error)
}

fn stage(path: &Path, contents: &[u8]) -> Result<NamedTempFile, ScrapeError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(|e| write_error(path, e))?;
    file.write_all(contents).map_err(|e| write_error(path, e))?;
    file.as_file().sync_all().map_err(|e| write_error(path, e))?;
    Ok(file)
}

fn roll_back(placed: &[PathBuf]) {
    for path in placed {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), "Failed to remove output after a failed write: {e}");
        }
    }
}

fn write_error(path: &Path, source: io::Error) -> ScrapeError {
    ScrapeError::Write {
        path: path.to_path_buf(),
        source,
    }
}
