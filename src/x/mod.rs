//! Everything specific to X (formerly Twitter): URL shapes, rendered markup,
//! and media payloads.

pub mod markup;
pub mod url;
pub mod variants;

pub use self::markup::{scan_page, PageScan, Tombstone};
pub use self::url::{is_login_redirect, StatusUrl};
