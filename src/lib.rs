//! influss: a read-it-later service.
//!
//! Articles are clipped through an HTTP API, persisted by a [`storage::Store`]
//! backend and republished as an RSS feed.

pub mod clip;
pub mod config;
pub mod content;
pub mod feed;
pub mod server;
pub mod storage;
pub mod util;
