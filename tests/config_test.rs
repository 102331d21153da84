//! Integration tests for loading configuration from the environment.

use std::time::Duration;

use serial_test::serial;

use x_thread_scraper::config::{Config, ConfigError, ThreadScope, VideoMode};

const VARS: [&str; 17] = [
    "X_AUTH_TOKEN",
    "X_CT0",
    "X_TWID",
    "TIMEZONE",
    "EXTRACT_MP4_ONLY",
    "THREAD_SCOPE",
    "CHROME_PATH",
    "HEADLESS",
    "PROXY",
    "VIEWPORT_WIDTH",
    "VIEWPORT_HEIGHT",
    "PAGE_TIMEOUT_SECS",
    "SCROLL_PAUSE_MS",
    "MAX_SCROLLS",
    "MAX_IDLE_ROUNDS",
    "COLLECT_BUDGET_SECS",
    "LOG_FORMAT",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults() {
    clear_env();
    std::env::set_var("X_AUTH_TOKEN", "0123456789abcdef0123456789abcdef01234567");

    let config = Config::from_env().expect("Failed to load config");
    config.validate().expect("Defaults should validate");

    assert_eq!(config.timezone, "UTC");
    assert!(config.headless);
    assert_eq!(config.thread_scope, ThreadScope::Chain);
    assert_eq!(config.video_mode, VideoMode::Progressive);
    assert_eq!(config.page_timeout, Duration::from_secs(60));
    assert_eq!(config.scroll_pause, Duration::from_millis(800));
    assert_eq!(config.max_scrolls, 40);
    assert_eq!(config.max_idle_rounds, 3);
    assert_eq!((config.viewport_width, config.viewport_height), (1280, 1600));
    assert!(config.ct0.is_none());
    assert!(config.proxy.is_none());

    clear_env();
}

#[test]
#[serial]
fn test_missing_token() {
    clear_env();

    let err = Config::from_env().expect_err("Token is required");
    assert!(matches!(err, ConfigError::MissingEnvVar(ref name) if name == "X_AUTH_TOKEN"));
}

#[test]
#[serial]
fn test_overrides() {
    clear_env();
    std::env::set_var("X_AUTH_TOKEN", "0123456789abcdef0123456789abcdef01234567");
    std::env::set_var("X_CT0", "csrf-token");
    std::env::set_var("TIMEZONE", "Europe/Lisbon");
    std::env::set_var("EXTRACT_MP4_ONLY", "false");
    std::env::set_var("THREAD_SCOPE", "author");
    std::env::set_var("HEADLESS", "0");
    std::env::set_var("PROXY", "socks5://127.0.0.1:9050");
    std::env::set_var("MAX_SCROLLS", "5");

    let config = Config::from_env().expect("Failed to load config");
    config.validate().expect("Overrides should validate");

    assert_eq!(config.ct0.as_deref(), Some("csrf-token"));
    assert_eq!(config.timezone, "Europe/Lisbon");
    assert_eq!(config.video_mode, VideoMode::Manifest);
    assert_eq!(config.thread_scope, ThreadScope::Author);
    assert!(!config.headless);
    assert_eq!(config.proxy.as_deref(), Some("socks5://127.0.0.1:9050"));
    assert_eq!(config.max_scrolls, 5);

    clear_env();
}

#[test]
#[serial]
fn test_unparseable_values() {
    clear_env();
    std::env::set_var("X_AUTH_TOKEN", "0123456789abcdef0123456789abcdef01234567");

    std::env::set_var("MAX_SCROLLS", "lots");
    assert!(matches!(Config::from_env(), Err(ConfigError::ParseInt { .. })));
    std::env::remove_var("MAX_SCROLLS");

    std::env::set_var("HEADLESS", "sometimes");
    assert!(matches!(Config::from_env(), Err(ConfigError::ParseBool { .. })));
    std::env::remove_var("HEADLESS");

    std::env::set_var("THREAD_SCOPE", "everyone");
    assert!(matches!(Config::from_env(), Err(ConfigError::InvalidValue { .. })));

    clear_env();
}

#[test]
#[serial]
fn test_invalid_timezone_fails_validation() {
    clear_env();
    std::env::set_var("X_AUTH_TOKEN", "0123456789abcdef0123456789abcdef01234567");
    std::env::set_var("TIMEZONE", "somewhere nice");

    let config = Config::from_env().expect("Loading does not validate");
    assert!(config.validate().is_err());

    clear_env();
}
