//! X thread scraper library.
//!
//! Drives a headless Chromium session carrying the user's X cookies, scrolls a
//! thread until it stops growing, resolves each post's media to downloadable
//! URLs and writes the result as JSON.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod browser;
pub mod config;
pub mod constants;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod thread;
pub mod writer;
pub mod x;
