use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// `auth_token` cookies issued by X are 40 lowercase hex characters.
static AUTH_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").unwrap());

/// Accepts `UTC` or an `Area/Location[/Sub]` IANA identifier.
static TIMEZONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(UTC|GMT|[A-Z][A-Za-z_\-]+(/[A-Za-z0-9_\-+]+){1,2})$").unwrap()
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Which posts below the root count as part of the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadScope {
    /// The contiguous run of root-author posts starting at the root.
    Chain,
    /// Every post by the root author rendered below the root.
    Author,
}

/// How video attachments are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMode {
    /// A single directly downloadable MP4.
    Progressive,
    /// The HLS master playlist as published by the player.
    Manifest,
}

impl VideoMode {
    #[must_use]
    pub const fn from_mp4_only(mp4_only: bool) -> Self {
        if mp4_only {
            Self::Progressive
        } else {
            Self::Manifest
        }
    }
}

/// Immutable run configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Session
    pub auth_token: String,
    pub ct0: Option<String>,
    pub twid: Option<String>,
    pub timezone: String,

    // Browser
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub proxy: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub page_timeout: Duration,

    // Collection
    pub thread_scope: ThreadScope,
    pub scroll_pause: Duration,
    pub max_scrolls: usize,
    pub max_idle_rounds: usize,
    pub collect_budget: Duration,

    // Media
    pub video_mode: VideoMode,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Session
            auth_token: required_env("X_AUTH_TOKEN")?,
            ct0: optional_env("X_CT0"),
            twid: optional_env("X_TWID"),
            timezone: env_or_default("TIMEZONE", "UTC"),

            // Browser
            chrome_path: optional_env("CHROME_PATH").map(PathBuf::from),
            headless: parse_env_bool("HEADLESS", true)?,
            proxy: optional_env("PROXY"),
            viewport_width: parse_env_u32("VIEWPORT_WIDTH", 1280)?,
            viewport_height: parse_env_u32("VIEWPORT_HEIGHT", 1600)?,
            page_timeout: Duration::from_secs(parse_env_u64("PAGE_TIMEOUT_SECS", 60)?),

            // Collection
            thread_scope: parse_thread_scope(&env_or_default("THREAD_SCOPE", "chain"))?,
            scroll_pause: Duration::from_millis(parse_env_u64("SCROLL_PAUSE_MS", 800)?),
            max_scrolls: parse_env_usize("MAX_SCROLLS", 40)?,
            max_idle_rounds: parse_env_usize("MAX_IDLE_ROUNDS", 3)?,
            collect_budget: Duration::from_secs(parse_env_u64("COLLECT_BUDGET_SECS", 180)?),

            // Media
            video_mode: VideoMode::from_mp4_only(parse_env_bool("EXTRACT_MP4_ONLY", true)?),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// Token shape is not checked here; that is an authentication concern
    /// (see [`Config::token_is_well_formed`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !TIMEZONE_PATTERN.is_match(&self.timezone) {
            return Err(ConfigError::InvalidValue {
                name: "TIMEZONE".to_string(),
                message: format!("'{}' is not an IANA timezone identifier", self.timezone),
            });
        }
        if self.page_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "PAGE_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_idle_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_IDLE_ROUNDS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.collect_budget.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "COLLECT_BUDGET_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(ConfigError::InvalidValue {
                name: "VIEWPORT_WIDTH/VIEWPORT_HEIGHT".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if let Some(ref proxy) = self.proxy {
            if url::Url::parse(proxy).is_err() {
                return Err(ConfigError::InvalidValue {
                    name: "PROXY".to_string(),
                    message: format!("'{proxy}' is not a URL"),
                });
            }
        }
        Ok(())
    }

    /// Whether the session token has the shape X issues.
    #[must_use]
    pub fn token_is_well_formed(&self) -> bool {
        AUTH_TOKEN_PATTERN.is_match(self.auth_token.trim())
    }

    /// Configuration with sensible defaults for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            auth_token: "0123456789abcdef0123456789abcdef01234567".to_string(),
            ct0: None,
            twid: None,
            timezone: "UTC".to_string(),
            chrome_path: None,
            headless: true,
            proxy: None,
            viewport_width: 1280,
            viewport_height: 1600,
            page_timeout: Duration::from_secs(5),
            thread_scope: ThreadScope::Chain,
            scroll_pause: Duration::ZERO,
            max_scrolls: 40,
            max_idle_rounds: 3,
            collect_budget: Duration::from_secs(30),
            video_mode: VideoMode::Progressive,
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => parse_bool(name, &val),
        _ => Ok(default),
    }
}

fn parse_bool(name: &str, val: &str) -> Result<bool, ConfigError> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ParseBool {
            name: name.to_string(),
            value: val.to_string(),
        }),
    }
}

fn parse_thread_scope(value: &str) -> Result<ThreadScope, ConfigError> {
    match value.to_lowercase().as_str() {
        "chain" => Ok(ThreadScope::Chain),
        "author" => Ok(ThreadScope::Author),
        _ => Err(ConfigError::InvalidValue {
            name: "THREAD_SCOPE".to_string(),
            message: format!("must be 'chain' or 'author', got '{value}'"),
        }),
    }
}
