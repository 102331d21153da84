//! Media resolution.
//!
//! Images always resolve to their original-size URL. Videos resolve from a
//! [`MediaCatalog`] filled with variants observed while the thread loaded,
//! according to the configured [`VideoMode`].

use std::collections::HashMap;

use tracing::debug;

use crate::config::VideoMode;
use crate::error::UnresolvedMedia;
use crate::thread::{MediaAttachment, MediaKind, RawMedia, ScannedPost};
use crate::x::variants::{
    gif_file_from_poster, is_manifest, is_progressive_file, media_id_from_poster,
    original_image_url, variant_from_url, variants_from_payload, VariantKind, VideoVariant,
};

/// Video variants seen during a run, keyed by media id.
#[derive(Debug, Default, Clone)]
pub struct MediaCatalog {
    variants: HashMap<String, Vec<VideoVariant>>,
}

impl MediaCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a URL seen on the network, if it is a video variant.
    pub fn observe_url(&mut self, url: &str) {
        if let Some(variant) = variant_from_url(url) {
            self.insert(variant);
        }
    }

    /// Record every variant in an API payload.
    pub fn observe_payload(&mut self, payload: &serde_json::Value) {
        for variant in variants_from_payload(payload) {
            self.insert(variant);
        }
    }

    fn insert(&mut self, variant: VideoVariant) {
        let entry = self.variants.entry(variant.media_id.clone()).or_default();
        match entry.iter_mut().find(|v| v.url == variant.url) {
            Some(existing) => {
                existing.bitrate = existing.bitrate.or(variant.bitrate);
                existing.area = existing.area.or(variant.area);
            }
            None => {
                debug!(media_id = %variant.media_id, url = %variant.url, kind = ?variant.kind, "Observed video variant");
                entry.push(variant);
            }
        }
    }

    /// Best variant of `kind` for a media id: highest bitrate, then highest
    /// resolution. A variant with a known bitrate beats one without. Ties keep
    /// the first seen.
    #[must_use]
    pub fn best(&self, media_id: &str, kind: VariantKind) -> Option<&VideoVariant> {
        self.variants
            .get(media_id)?
            .iter()
            .filter(|v| v.kind == kind)
            .reduce(|best, v| if v.quality() > best.quality() { v } else { best })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Resolves raw media references into attachments.
pub struct MediaResolver<'a> {
    catalog: &'a MediaCatalog,
    mode: VideoMode,
}

impl<'a> MediaResolver<'a> {
    #[must_use]
    pub const fn new(catalog: &'a MediaCatalog, mode: VideoMode) -> Self {
        Self { catalog, mode }
    }

    /// Resolve every attachment of a post.
    ///
    /// Attachments that cannot be resolved are returned separately and left
    /// out of the post.
    #[must_use]
    pub fn resolve_post(&self, post: &ScannedPost) -> (Vec<MediaAttachment>, Vec<UnresolvedMedia>) {
        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();

        for media in &post.media {
            match self.resolve(&post.id, media) {
                Ok(attachment) => resolved.push(attachment),
                Err(err) => unresolved.push(err),
            }
        }

        (resolved, unresolved)
    }

    /// Resolve one attachment.
    ///
    /// # Errors
    ///
    /// Returns [`UnresolvedMedia`] when no URL of the configured kind is known.
    pub fn resolve(&self, post_id: &str, media: &RawMedia) -> Result<MediaAttachment, UnresolvedMedia> {
        match media {
            RawMedia::Image { src } => Ok(MediaAttachment {
                kind: MediaKind::Image,
                url: original_image_url(src),
            }),
            RawMedia::Video { poster, src } => {
                let url = match self.mode {
                    VideoMode::Progressive => self.progressive(poster.as_deref(), src.as_deref()),
                    VideoMode::Manifest => self.manifest(poster.as_deref(), src.as_deref()),
                };
                url.map(|url| MediaAttachment {
                    kind: MediaKind::Video,
                    url,
                })
                .ok_or_else(|| UnresolvedMedia {
                    post_id: post_id.to_string(),
                    kind: MediaKind::Video,
                    reason: match self.mode {
                        VideoMode::Progressive => "no progressive variant offered".to_string(),
                        VideoMode::Manifest => "no streaming manifest observed".to_string(),
                    },
                })
            }
        }
    }

    fn progressive(&self, poster: Option<&str>, src: Option<&str>) -> Option<String> {
        if let Some(src) = src.filter(|s| is_progressive_file(s)) {
            return Some(src.to_string());
        }
        let poster = poster?;
        if let Some(gif) = gif_file_from_poster(poster) {
            return Some(gif);
        }
        let media_id = media_id_from_poster(poster)?;
        self.catalog
            .best(&media_id, VariantKind::Progressive)
            .map(|v| v.url.clone())
    }

    fn manifest(&self, poster: Option<&str>, src: Option<&str>) -> Option<String> {
        if let Some(src) = src.filter(|s| is_manifest(s)) {
            return Some(src.to_string());
        }
        let media_id = media_id_from_poster(poster?)?;
        self.catalog
            .best(&media_id, VariantKind::Manifest)
            .map(|v| v.url.clone())
    }
}
