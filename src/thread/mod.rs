//! Thread data model.
//!
//! [`ScannedPost`] is what the collector pulls out of the page, with media
//! still as raw DOM references. [`Post`] is the resolved, serialized form.

mod collector;

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use collector::{CollectStats, Collector, CollectorLimits, StopReason, ThreadSurface};

/// Engagement counters. Missing counters are 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
    pub views: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Media as referenced by the rendered post, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMedia {
    Image {
        src: String,
    },
    Video {
        /// Poster thumbnail; carries the media id.
        poster: Option<String>,
        /// `src` of the `<video>` element, usually a `blob:` URL.
        src: Option<String>,
    },
}

impl RawMedia {
    #[must_use]
    pub const fn kind(&self) -> MediaKind {
        match self {
            Self::Image { .. } => MediaKind::Image,
            Self::Video { .. } => MediaKind::Video,
        }
    }
}

/// A post as extracted from one page snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedPost {
    pub id: String,
    pub author: String,
    pub display_name: Option<String>,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub counters: Counters,
    pub media: Vec<RawMedia>,
}

/// A resolved media attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub url: String,
}

/// A post as written to the output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counters: Counters,
    pub media: Vec<MediaAttachment>,
}

impl Post {
    /// Build a post from its scanned form and resolved media.
    #[must_use]
    pub fn from_scanned(scanned: ScannedPost, media: Vec<MediaAttachment>) -> Self {
        Self {
            id: scanned.id,
            author: scanned.author,
            display_name: scanned.display_name,
            text: scanned.text,
            timestamp: scanned.timestamp,
            counters: scanned.counters,
            media,
        }
    }
}

/// Ordered posts of one thread, keyed by the root post id.
///
/// Insertion order is preserved and ids are unique: pushing an id that is
/// already present is a no-op.
#[derive(Debug, Clone)]
pub struct Thread {
    root_id: String,
    posts: Vec<Post>,
    ids: HashSet<String>,
}

impl Thread {
    #[must_use]
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            posts: Vec::new(),
            ids: HashSet::new(),
        }
    }

    #[must_use]
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Append a post. Returns `false` if its id was already present.
    pub fn push(&mut self, post: Post) -> bool {
        if !self.ids.insert(post.id.clone()) {
            return false;
        }
        self.posts.push(post);
        true
    }

    #[must_use]
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    #[must_use]
    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, text: &str) -> Post {
        Post {
            id: id.to_string(),
            author: "naval".to_string(),
            display_name: None,
            text: text.to_string(),
            timestamp: None,
            counters: Counters::default(),
            media: Vec::new(),
        }
    }

    #[test]
    fn test_thread_keeps_first_seen_instance() {
        let mut thread = Thread::new("1");
        assert!(thread.push(post("1", "first")));
        assert!(thread.push(post("2", "second")));
        assert!(!thread.push(post("1", "re-rendered")));

        assert_eq!(thread.len(), 2);
        assert_eq!(thread.posts()[0].text, "first");
        assert_eq!(thread.root_id(), "1");
    }

    #[test]
    fn test_post_serializes_flat_counters() {
        let mut p = post("7", "hello");
        p.counters = Counters {
            likes: 3,
            reposts: 2,
            replies: 1,
            views: 100,
        };
        p.media.push(MediaAttachment {
            kind: MediaKind::Image,
            url: "https://pbs.twimg.com/media/A.jpg?name=orig".to_string(),
        });

        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["id"], "7");
        assert_eq!(json["likes"], 3);
        assert_eq!(json["views"], 100);
        assert!(json["timestamp"].is_null());
        assert!(json.get("display_name").is_none());
        assert_eq!(json["media"][0]["kind"], "image");
    }
}
