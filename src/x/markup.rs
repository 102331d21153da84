//! Extraction of posts from X's rendered thread markup.
//!
//! This is the only place that knows about X's DOM. Everything downstream
//! works on [`PageScan`] and [`ScannedPost`], so a markup change on the site
//! means touching this file and nothing else.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use super::url::split_permalink;
use crate::thread::{Counters, RawMedia, ScannedPost};

static ARTICLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"article[data-testid="tweet"], article[role="article"]"#).unwrap());
static STATUS_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/status/"]"#).unwrap());
static TIME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("time").unwrap());
static USER_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-testid="User-Name"]"#).unwrap());
static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
static TWEET_TEXT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-testid="tweetText"]"#).unwrap());
static ACTION_GROUP: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[role="group"][aria-label]"#).unwrap());
static ANALYTICS_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href$="/analytics"]"#).unwrap());
static PHOTO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"img[src*="pbs.twimg.com/media/"]"#).unwrap());
static VIDEO: LazyLock<Selector> = LazyLock::new(|| Selector::parse("video").unwrap());
static VIDEO_SOURCE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("source[src]").unwrap());
/// Labels X puts in the corner of paid placements.
const PROMOTED_LABELS: [&str; 2] = ["Ad", "Promoted"];
static LOGIN_FORM: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[autocomplete="username"], [data-testid="loginButton"]"#).unwrap()
});

/// `"1,234 replies, 5 reposts, 67 likes, 2 bookmarks, 8.9K views"`
static GROUP_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,.]*\s*[KMB]?)\s+(repl|repost|retweet|like|bookmark|view)").unwrap()
});

/// Per-button fallbacks, used when the action group carries no label.
const COUNTER_TEST_IDS: [(&str, Counter); 5] = [
    ("reply", Counter::Replies),
    ("retweet", Counter::Reposts),
    ("unretweet", Counter::Reposts),
    ("like", Counter::Likes),
    ("unlike", Counter::Likes),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counter {
    Likes,
    Reposts,
    Replies,
}

/// Why a post that should be on the page is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tombstone {
    Deleted,
    Unavailable,
    Protected,
    AgeRestricted,
}

impl Tombstone {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Deleted => "post was deleted",
            Self::Unavailable => "post is unavailable",
            Self::Protected => "account is protected",
            Self::AgeRestricted => "post is age-restricted",
        }
    }
}

/// Everything one snapshot of the page tells us.
#[derive(Debug, Default, Clone)]
pub struct PageScan {
    /// Posts in display order. Promoted posts are left out.
    pub posts: Vec<ScannedPost>,
    /// First tombstone notice found on the page.
    pub tombstone: Option<Tombstone>,
    /// The page is X's "this page doesn't exist" error.
    pub missing_page: bool,
    /// The page is asking for a login.
    pub login_wall: bool,
    /// Promoted posts that were skipped.
    pub promoted: usize,
}

impl PageScan {
    /// Whether anything worth waiting for has rendered.
    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.posts.is_empty() || self.tombstone.is_some() || self.missing_page || self.login_wall
    }

    #[must_use]
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.posts.iter().position(|p| p.id == id)
    }
}

/// Scan rendered thread HTML.
#[must_use]
pub fn scan_page(html: &str) -> PageScan {
    let document = Html::parse_document(html);
    let mut scan = PageScan::default();

    for article in document.select(&ARTICLE) {
        if is_promoted(article) {
            scan.promoted += 1;
            continue;
        }
        if let Some(post) = extract_post(article) {
            // Nested article selectors can match twice.
            if !scan.posts.iter().any(|p| p.id == post.id) {
                scan.posts.push(post);
            }
        }
    }

    let page_text = document
        .root_element()
        .text()
        .collect::<String>()
        .replace('\u{2019}', "'")
        .to_lowercase();

    scan.tombstone = detect_tombstone(&page_text);
    scan.missing_page = page_text.contains("this page doesn't exist");
    scan.login_wall = scan.posts.is_empty() && document.select(&LOGIN_FORM).next().is_some();

    scan
}

fn detect_tombstone(page_text: &str) -> Option<Tombstone> {
    const MARKERS: [(&str, Tombstone); 8] = [
        ("this post was deleted", Tombstone::Deleted),
        ("this tweet was deleted", Tombstone::Deleted),
        ("account that no longer exists", Tombstone::Deleted),
        ("this post is unavailable", Tombstone::Unavailable),
        ("this tweet is unavailable", Tombstone::Unavailable),
        ("these posts are protected", Tombstone::Protected),
        ("only approved followers", Tombstone::Protected),
        ("age-restricted", Tombstone::AgeRestricted),
    ];

    MARKERS
        .iter()
        .find(|(marker, _)| page_text.contains(marker))
        .map(|(_, tombstone)| *tombstone)
}

fn extract_post(article: ElementRef<'_>) -> Option<ScannedPost> {
    let links: Vec<ElementRef<'_>> = article
        .select(&STATUS_LINK)
        .filter(|a| !inside_quote(*a, article))
        .collect();

    // The timestamp link is the post's own permalink; fall back to the first
    // bare permalink when the timestamp is missing.
    let permalink = links
        .iter()
        .copied()
        .find(|a| a.select(&TIME).next().is_some() && href_permalink(*a).is_some())
        .or_else(|| links.iter().copied().find(|a| href_permalink(*a).is_some()))?;

    let (author, id) = href_permalink(permalink)?;

    let timestamp = permalink
        .select(&TIME)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let display_name = first_outside_quote(article, &USER_NAME).and_then(|block| {
        block
            .select(&SPAN)
            .map(rich_text)
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty() && !s.starts_with('@'))
    });

    let text = first_outside_quote(article, &TWEET_TEXT)
        .map(|el| normalize_whitespace(&rich_text(el)))
        .unwrap_or_default();

    Some(ScannedPost {
        id,
        author,
        display_name,
        text,
        timestamp,
        counters: extract_counters(article),
        media: extract_media(article),
    })
}

/// Paid placements carry a bare "Ad"/"Promoted" label outside the post body.
///
/// `placementTracking` wrappers are not a signal: organic video players sit
/// inside them too.
fn is_promoted(article: ElementRef<'_>) -> bool {
    article.select(&SPAN).any(|span| {
        let label = span.text().collect::<String>();
        PROMOTED_LABELS.contains(&label.trim())
            && !inside_quote(span, article)
            && !inside_test_id(span, article, &["tweetText", "User-Name"])
    })
}

fn inside_test_id(el: ElementRef<'_>, article: ElementRef<'_>, test_ids: &[&str]) -> bool {
    for node in el.ancestors() {
        if node.id() == article.id() {
            return false;
        }
        let test_id = node
            .value()
            .as_element()
            .and_then(|element| element.attr("data-testid"));
        if test_id.is_some_and(|id| test_ids.contains(&id)) {
            return true;
        }
    }
    false
}

fn href_permalink(anchor: ElementRef<'_>) -> Option<(String, String)> {
    anchor.value().attr("href").and_then(split_permalink)
}

fn first_outside_quote<'a>(article: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    article.select(selector).find(|el| !inside_quote(*el, article))
}

/// Whether `el` sits inside a quoted post embedded in `article`.
///
/// Quoted posts render as a `div[role="link"]` card within the quoting article.
fn inside_quote(el: ElementRef<'_>, article: ElementRef<'_>) -> bool {
    for node in el.ancestors() {
        if node.id() == article.id() {
            return false;
        }
        if let Some(element) = node.value().as_element() {
            if element.name() == "div" && element.attr("role") == Some("link") {
                return true;
            }
        }
    }
    false
}

/// Text content with emoji images replaced by their `alt` text.
fn rich_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) if element.name() == "img" => {
                if let Some(alt) = element.attr("alt") {
                    out.push_str(alt);
                }
            }
            _ => {}
        }
    }
    out
}

/// Collapse runs of spaces within lines and drop blank lines.
#[must_use]
pub fn normalize_whitespace(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_counters(article: ElementRef<'_>) -> Counters {
    let mut counters = Counters::default();

    let group_label = first_outside_quote(article, &ACTION_GROUP)
        .and_then(|g| g.value().attr("aria-label"))
        .unwrap_or_default();

    let mut labelled = false;
    for caps in GROUP_COUNT.captures_iter(group_label) {
        let value = parse_count(&caps[1]);
        match caps[2].to_lowercase().as_str() {
            "repl" => counters.replies = value,
            "repost" | "retweet" => counters.reposts = value,
            "like" => counters.likes = value,
            "view" => counters.views = value,
            _ => {}
        }
        labelled = true;
    }

    if !labelled {
        for (test_id, counter) in COUNTER_TEST_IDS {
            let Ok(selector) = Selector::parse(&format!(r#"[data-testid="{test_id}"]"#)) else {
                continue;
            };
            let Some(button) = first_outside_quote(article, &selector) else {
                continue;
            };
            let value = parse_count(&button.text().collect::<String>());
            match counter {
                Counter::Likes => counters.likes = value,
                Counter::Reposts => counters.reposts = value,
                Counter::Replies => counters.replies = value,
            }
        }
    }

    if counters.views == 0 {
        if let Some(views) = first_outside_quote(article, &ANALYTICS_LINK)
            .and_then(|a| a.value().attr("aria-label"))
            .and_then(|label| GROUP_COUNT.captures(label))
            .map(|caps| parse_count(&caps[1]))
        {
            counters.views = views;
        }
    }

    counters
}

/// Parse a displayed counter: `"1,234"`, `"1.2K"`, `"3M"`, `""`.
///
/// Unparseable input counts as 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_count(raw: &str) -> u64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return 0;
    }

    let (number, multiplier) = match cleaned.chars().last() {
        Some('K' | 'k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('M' | 'm') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        Some('B' | 'b') => (&cleaned[..cleaned.len() - 1], 1_000_000_000.0),
        _ => {
            // Without a suffix a dot is a thousands separator ("1.234").
            return cleaned.replace('.', "").parse().unwrap_or(0);
        }
    };

    match number.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * multiplier).round() as u64,
        _ => 0,
    }
}

fn extract_media(article: ElementRef<'_>) -> Vec<RawMedia> {
    let mut media = Vec::new();

    for img in article.select(&PHOTO) {
        if inside_quote(img, article) {
            continue;
        }
        if let Some(src) = img.value().attr("src") {
            let item = RawMedia::Image {
                src: src.to_string(),
            };
            if !media.contains(&item) {
                media.push(item);
            }
        }
    }

    for video in article.select(&VIDEO) {
        if inside_quote(video, article) {
            continue;
        }
        let src = video
            .value()
            .attr("src")
            .or_else(|| {
                video
                    .select(&VIDEO_SOURCE)
                    .next()
                    .and_then(|s| s.value().attr("src"))
            })
            .map(String::from);
        let item = RawMedia::Video {
            poster: video.value().attr("poster").map(String::from),
            src,
        };
        if !media.contains(&item) {
            media.push(item);
        }
    }

    media
}
