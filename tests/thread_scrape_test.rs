//! End-to-end tests of collection, media resolution and output against
//! scripted page snapshots.

use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use x_thread_scraper::config::{Config, ThreadScope, VideoMode};
use x_thread_scraper::error::ScrapeError;
use x_thread_scraper::media::MediaCatalog;
use x_thread_scraper::pipeline::assemble_thread;
use x_thread_scraper::thread::{Collector, CollectorLimits, MediaKind, Post, ThreadSurface};
use x_thread_scraper::writer::{write_json, write_markdown};

const AUTHOR: &str = "naval";
const VIDEO_POSTER: &str = "https://pbs.twimg.com/ext_tw_video_thumb/1790000000000000001/pu/img/poster.jpg";
const VIDEO_MASTER: &str =
    "https://video.twimg.com/ext_tw_video/1790000000000000001/pu/pl/master.m3u8?tag=12&v=1";
const VIDEO_LOW: &str =
    "https://video.twimg.com/ext_tw_video/1790000000000000001/pu/vid/avc1/320x568/low.mp4?tag=12";
const VIDEO_HIGH: &str =
    "https://video.twimg.com/ext_tw_video/1790000000000000001/pu/vid/avc1/720x1280/high.mp4?tag=12";

/// Replays a fixed sequence of page snapshots; each advance reveals the next.
struct ScriptedSurface {
    frames: Vec<String>,
    position: usize,
}

impl ScriptedSurface {
    fn new(frames: Vec<String>) -> Self {
        Self {
            frames,
            position: 0,
        }
    }
}

#[async_trait]
impl ThreadSurface for ScriptedSurface {
    async fn rewind(&mut self) -> Result<(), ScrapeError> {
        self.position = 0;
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<String, ScrapeError> {
        Ok(self.frames[self.position.min(self.frames.len() - 1)].clone())
    }

    async fn advance(&mut self) -> Result<(), ScrapeError> {
        self.position += 1;
        Ok(())
    }
}

struct Article<'a> {
    id: &'a str,
    handle: &'a str,
    text: &'a str,
    counts: &'a str,
    media: String,
}

impl<'a> Article<'a> {
    fn new(id: &'a str, handle: &'a str, text: &'a str) -> Self {
        Self {
            id,
            handle,
            text,
            counts: "",
            media: String::new(),
        }
    }

    fn counts(mut self, label: &'a str) -> Self {
        self.counts = label;
        self
    }

    fn photo(mut self, src: &str) -> Self {
        self.media.push_str(&format!(
            r#"<div data-testid="tweetPhoto"><img alt="Image" src="{src}"></div>"#
        ));
        self
    }

    fn video(mut self, poster: &str) -> Self {
        self.media.push_str(&format!(
            r#"<div data-testid="videoPlayer"><video preload="none" poster="{poster}" src="blob:https://x.com/5b1c"></video></div>"#
        ));
        self
    }

    fn quoting(mut self, id: &str, handle: &str) -> Self {
        self.media.push_str(&format!(
            r#"<div role="link" tabindex="0">
                <div data-testid="User-Name"><span>Quoted</span><span>@{handle}</span>
                    <a href="/{handle}/status/{id}"><time datetime="2023-12-01T08:00:00.000Z">Dec 1</time></a>
                </div>
                <div data-testid="tweetText"><span>quoted text</span></div>
                <img src="https://pbs.twimg.com/media/QuotedImg?format=jpg&amp;name=small">
            </div>"#
        ));
        self
    }

    fn render(&self) -> String {
        let Self {
            id,
            handle,
            text,
            counts,
            media,
        } = self;
        format!(
            r#"<div data-testid="cellInnerDiv"><article data-testid="tweet" role="article" tabindex="-1">
                <div data-testid="User-Name">
                    <a href="/{handle}" role="link"><span>Display {handle}</span></a>
                    <a href="/{handle}" role="link" tabindex="-1"><span>@{handle}</span></a>
                    <a href="/{handle}/status/{id}" role="link"><time datetime="2024-05-01T09:30:00.000Z">May 1</time></a>
                </div>
                <div data-testid="tweetText" lang="en"><span>{text}</span></div>
                {media}
                <div role="group" aria-label="{counts}">
                    <button data-testid="reply"></button>
                    <button data-testid="retweet"></button>
                    <button data-testid="like"></button>
                </div>
                <a href="/{handle}/status/{id}/analytics" aria-label="{counts}"></a>
            </article></div>"#
        )
    }
}

fn page(articles: &[Article<'_>]) -> String {
    let body: String = articles.iter().map(Article::render).collect();
    format!(
        r#"<html><body><main role="main"><div aria-label="Timeline: Conversation">{body}</div></main></body></html>"#
    )
}

fn limits() -> CollectorLimits {
    CollectorLimits {
        max_scrolls: 10,
        max_idle_rounds: 2,
        budget: Duration::from_secs(30),
    }
}

fn catalog() -> MediaCatalog {
    let mut catalog = MediaCatalog::new();
    catalog.observe_url(VIDEO_MASTER);
    catalog.observe_url(VIDEO_LOW);
    catalog.observe_url(VIDEO_HIGH);
    catalog
}

/// A thread of four author posts under an ancestor, with a reply from
/// someone else after the second post and re-rendered posts across scrolls.
fn thread_frames() -> Vec<String> {
    vec![
        page(&[
            Article::new("100", "someone", "the question"),
            Article::new("200", AUTHOR, "1/ How to get rich")
                .counts("12 replies, 340 reposts, 1,234 likes, 55 bookmarks, 98.7K views")
                .photo("https://pbs.twimg.com/media/FirstImg?format=jpg&name=small"),
            Article::new("201", AUTHOR, "2/ Seek wealth, not money or status.")
                .video(VIDEO_POSTER),
        ]),
        page(&[
            Article::new("201", AUTHOR, "2/ Seek wealth, not money or status.")
                .video(VIDEO_POSTER),
            Article::new("202", AUTHOR, "3/ Understand ethical wealth creation.")
                .quoting("900", "elsewhere"),
            Article::new("203", AUTHOR, "4/ Ignore people playing status games."),
        ]),
        page(&[
            Article::new("203", AUTHOR, "4/ Ignore people playing status games."),
            Article::new("300", "replier", "great thread"),
            Article::new("204", AUTHOR, "5/ answering the replier"),
        ]),
    ]
}

async fn collect(frames: Vec<String>, config: &Config) -> Result<Vec<Post>, ScrapeError> {
    let mut surface = ScriptedSurface::new(frames);
    let collector = Collector::new("200", config.thread_scope, limits());
    let (scanned, _stats) = collector.collect(&mut surface).await?;
    let (thread, _unresolved) = assemble_thread("200", scanned, &catalog(), config);
    Ok(thread.into_posts())
}

fn ids(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|p| p.id.as_str()).collect()
}

#[tokio::test]
async fn test_chain_scope_stops_at_first_foreign_post() {
    let config = Config::for_testing();
    let posts = collect(thread_frames(), &config)
        .await
        .expect("Failed to collect thread");

    assert_eq!(ids(&posts), vec!["200", "201", "202", "203"]);
    assert!(posts.iter().all(|p| p.author == AUTHOR));
}

#[tokio::test]
async fn test_author_scope_includes_later_self_replies() {
    let config = Config {
        thread_scope: ThreadScope::Author,
        ..Config::for_testing()
    };
    let posts = collect(thread_frames(), &config)
        .await
        .expect("Failed to collect thread");

    assert_eq!(ids(&posts), vec!["200", "201", "202", "203", "204"]);
}

#[tokio::test]
async fn test_root_post_fields() {
    let config = Config::for_testing();
    let posts = collect(thread_frames(), &config)
        .await
        .expect("Failed to collect thread");
    let root = &posts[0];

    assert_eq!(root.display_name.as_deref(), Some("Display naval"));
    assert_eq!(root.text, "1/ How to get rich");
    assert_eq!(
        root.timestamp.map(|t| t.to_rfc3339()),
        Some("2024-05-01T09:30:00+00:00".to_string())
    );
    assert_eq!(root.counters.replies, 12);
    assert_eq!(root.counters.reposts, 340);
    assert_eq!(root.counters.likes, 1234);
    assert_eq!(root.counters.views, 98_700);
    assert_eq!(root.media.len(), 1);
    assert_eq!(root.media[0].kind, MediaKind::Image);
    assert_eq!(
        root.media[0].url,
        "https://pbs.twimg.com/media/FirstImg?format=jpg&name=orig"
    );
}

#[tokio::test]
async fn test_quoted_post_is_not_attributed_to_quoting_post() {
    let config = Config::for_testing();
    let posts = collect(thread_frames(), &config)
        .await
        .expect("Failed to collect thread");
    let quoting = posts.iter().find(|p| p.id == "202").expect("post 202");

    assert_eq!(quoting.text, "3/ Understand ethical wealth creation.");
    assert!(quoting.media.is_empty());
    assert!(posts.iter().all(|p| p.id != "900"));
}

#[tokio::test]
async fn test_video_mode_progressive_picks_largest_mp4() {
    let config = Config {
        video_mode: VideoMode::Progressive,
        ..Config::for_testing()
    };
    let posts = collect(thread_frames(), &config)
        .await
        .expect("Failed to collect thread");
    let video = &posts[1].media[0];

    assert_eq!(video.kind, MediaKind::Video);
    assert_eq!(video.url, VIDEO_HIGH);
}

#[tokio::test]
async fn test_video_mode_manifest_returns_master_playlist() {
    let config = Config {
        video_mode: VideoMode::Manifest,
        ..Config::for_testing()
    };
    let posts = collect(thread_frames(), &config)
        .await
        .expect("Failed to collect thread");
    let video = &posts[1].media[0];

    assert_eq!(video.kind, MediaKind::Video);
    assert_eq!(video.url, VIDEO_MASTER);
}

#[tokio::test]
async fn test_same_input_gives_same_output() {
    let config = Config::for_testing();
    let first = collect(thread_frames(), &config).await.expect("first run");
    let second = collect(thread_frames(), &config).await.expect("second run");

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_deleted_root_is_empty_thread() {
    let config = Config::for_testing();
    let frames = vec![
        r#"<html><body><main role="main">
            <article data-testid="tweet"><div><span>This Post was deleted by the Post author.</span>
            <a href="https://help.x.com/rules-and-policies/notices-on-x" rel="noopener">Learn more</a></div></article>
        </main></body></html>"#
            .to_string(),
    ];

    let err = collect(frames, &config).await.expect_err("deleted root");
    assert!(matches!(err, ScrapeError::EmptyThread(_)), "{err}");
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn test_written_json_matches_collected_posts() {
    let config = Config::for_testing();
    let posts = collect(thread_frames(), &config)
        .await
        .expect("Failed to collect thread");

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let json_path = temp_dir.path().join("thread.json");
    let md_path = temp_dir.path().join("thread.md");
    write_json(&json_path, &posts).expect("Failed to write JSON");
    write_markdown(&md_path, "https://x.com/naval/status/200", &posts)
        .expect("Failed to write Markdown");

    let raw = std::fs::read_to_string(&json_path).expect("Failed to read JSON");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("Output is not JSON");
    let array = value.as_array().expect("Output is not an array");
    assert_eq!(array.len(), posts.len());

    let root = &array[0];
    for key in [
        "id",
        "author",
        "text",
        "timestamp",
        "likes",
        "reposts",
        "replies",
        "views",
        "media",
    ] {
        assert!(root.get(key).is_some(), "missing {key}");
    }
    assert_eq!(root["likes"], 1234);
    assert_eq!(root["media"][0]["kind"], "image");

    let md = std::fs::read_to_string(&md_path).expect("Failed to read Markdown");
    assert!(md.contains("# Thread: https://x.com/naval/status/200"));
    assert_eq!(md.matches("\n---\n").count(), posts.len());
}
