//! X's media URL shapes and video variant payloads.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// `video.twimg.com/{ext_tw_video|amplify_video}/{media_id}/...`
static VIDEO_MEDIA_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://video\.twimg\.com/(?:ext_tw_video|amplify_video)/(\d+)/").unwrap()
});

/// Master playlists sit directly under `/pl/`; renditions are nested deeper.
static MASTER_PLAYLIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/pl/[^/]+\.m3u8(\?|$)").unwrap());

/// Progressive files: `/vid/[avc1/]{w}x{h}/{name}.mp4`. HLS init segments
/// carry a byte-range prefix (`/vid/avc1/0/0/...`) and do not match.
static PROGRESSIVE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/vid/(?:avc1/|hevc/)?(\d+)x(\d+)/[^/]+\.mp4(\?|$)").unwrap());

static POSTER_MEDIA_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"pbs\.twimg\.com/(?:ext_tw_video_thumb|amplify_video_thumb|media)/(\d+)/").unwrap()
});

static GIF_POSTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://pbs\.twimg\.com/tweet_video_thumb/([A-Za-z0-9_\-]+)\.\w+").unwrap()
});

static GIF_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://video\.twimg\.com/tweet_video/[A-Za-z0-9_\-]+\.mp4(\?|$)").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Progressive,
    Manifest,
}

/// One playable rendition of a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoVariant {
    pub media_id: String,
    pub url: String,
    pub kind: VariantKind,
    /// Bits per second, known only for variants listed in an API payload.
    pub bitrate: Option<u64>,
    /// Width times height, when the URL carries a resolution.
    pub area: Option<u64>,
}

impl VideoVariant {
    /// Ordering key: bitrate first, resolution second.
    #[must_use]
    pub fn quality(&self) -> (Option<u64>, Option<u64>) {
        (self.bitrate, self.area)
    }
}

#[derive(Debug, Deserialize)]
struct ApiVariant {
    #[serde(default)]
    bitrate: Option<u64>,
    content_type: String,
    url: String,
}

/// Classify a URL seen on the wire.
#[must_use]
pub fn variant_from_url(url: &str) -> Option<VideoVariant> {
    let media_id = VIDEO_MEDIA_ID.captures(url)?[1].to_string();

    if MASTER_PLAYLIST.is_match(url) {
        return Some(VideoVariant {
            media_id,
            url: url.to_string(),
            kind: VariantKind::Manifest,
            bitrate: None,
            area: None,
        });
    }

    let area = Some(area_from_url(url)?);
    Some(VideoVariant {
        media_id,
        url: url.to_string(),
        kind: VariantKind::Progressive,
        bitrate: None,
        area,
    })
}

fn area_from_url(url: &str) -> Option<u64> {
    let caps = PROGRESSIVE_FILE.captures(url)?;
    let width: u64 = caps[1].parse().ok()?;
    let height: u64 = caps[2].parse().ok()?;
    Some(width * height)
}

/// Whether a response carries post payloads worth mining for video variants.
#[must_use]
pub fn is_post_payload(url: &str) -> bool {
    url.contains("/graphql/")
        && (url.contains("TweetDetail") || url.contains("TweetResultByRestId"))
}

/// Walk a GraphQL payload and collect every `video_info.variants` entry.
#[must_use]
pub fn variants_from_payload(payload: &Value) -> Vec<VideoVariant> {
    let mut out = Vec::new();
    let mut stack = vec![payload];

    while let Some(value) = stack.pop() {
        match value {
            Value::Object(map) => {
                if let (Some(media_id), Some(variants)) = (
                    map.get("id_str").and_then(Value::as_str),
                    map.get("video_info").and_then(|v| v.get("variants")),
                ) {
                    let parsed: Vec<ApiVariant> =
                        serde_json::from_value(variants.clone()).unwrap_or_default();
                    out.extend(parsed.into_iter().filter_map(|v| api_variant(media_id, v)));
                }
                stack.extend(map.values());
            }
            Value::Array(items) => stack.extend(items.iter()),
            _ => {}
        }
    }

    out
}

fn api_variant(media_id: &str, variant: ApiVariant) -> Option<VideoVariant> {
    let kind = match variant.content_type.as_str() {
        "video/mp4" => VariantKind::Progressive,
        "application/x-mpegURL" | "application/vnd.apple.mpegurl" => VariantKind::Manifest,
        _ => return None,
    };
    Some(VideoVariant {
        media_id: media_id.to_string(),
        area: area_from_url(&variant.url),
        url: variant.url,
        kind,
        bitrate: variant.bitrate,
    })
}

/// Media id carried by a video poster URL.
#[must_use]
pub fn media_id_from_poster(poster: &str) -> Option<String> {
    POSTER_MEDIA_ID
        .captures(poster)
        .map(|caps| caps[1].to_string())
}

/// Animated GIFs are served as a single MP4 named after the poster key.
#[must_use]
pub fn gif_file_from_poster(poster: &str) -> Option<String> {
    GIF_POSTER
        .captures(poster)
        .map(|caps| format!("https://video.twimg.com/tweet_video/{}.mp4", &caps[1]))
}

/// Whether a URL is a directly downloadable video file.
#[must_use]
pub fn is_progressive_file(url: &str) -> bool {
    GIF_FILE.is_match(url) || PROGRESSIVE_FILE.is_match(url)
}

/// Whether a URL is an HLS playlist.
#[must_use]
pub fn is_manifest(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| {
        std::path::Path::new(u.path())
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("m3u8"))
    })
}

/// Full-resolution form of a `pbs.twimg.com/media` image URL.
#[must_use]
pub fn original_image_url(src: &str) -> String {
    let Ok(mut parsed) = Url::parse(src) else {
        return src.to_string();
    };

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != "name")
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    pairs.push(("name".to_string(), "orig".to_string()));

    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}
