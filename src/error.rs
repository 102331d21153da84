//! Error taxonomy for a scrape run.
//!
//! [`ScrapeError`] values are fatal: the run stops, the browser is closed and
//! no output file is produced. [`UnresolvedMedia`] is recorded per attachment
//! and never stops a run.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::thread::MediaKind;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("thread is empty: {0}")]
    EmptyThread(String),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("browser error: {0}")]
    Browser(String),
}

impl ScrapeError {
    /// Process exit code for this error class.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Browser(_) => 1,
            Self::Auth(_) => 2,
            Self::Navigation(_) => 3,
            Self::EmptyThread(_) => 4,
            Self::Write { .. } => 5,
            Self::Config(_) => 6,
        }
    }

    pub(crate) fn browser(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Browser(format!("{context}: {err}"))
    }
}

/// A media attachment that could not be resolved to a URL in the configured mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved {kind} attachment in post {post_id}: {reason}")]
pub struct UnresolvedMedia {
    pub post_id: String,
    pub kind: MediaKind,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_non_zero() {
        let errors = [
            ScrapeError::Browser("x".into()),
            ScrapeError::Auth("x".into()),
            ScrapeError::Navigation("x".into()),
            ScrapeError::EmptyThread("x".into()),
            ScrapeError::Write {
                path: PathBuf::from("out.json"),
                source: std::io::Error::other("x"),
            },
            ScrapeError::Config(ConfigError::MissingEnvVar("X_AUTH_TOKEN".into())),
        ];
        let mut codes: Vec<i32> = errors.iter().map(ScrapeError::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_unresolved_media_message() {
        let err = UnresolvedMedia {
            post_id: "42".to_string(),
            kind: MediaKind::Video,
            reason: "no progressive variant".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unresolved video attachment in post 42: no progressive variant"
        );
    }
}
