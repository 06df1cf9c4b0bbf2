//! RSS rendering of stored clips.
//!
//! [`FeedBuilder`] turns the most recent clips into an RSS 2.0 document with
//! the full article HTML in `content:encoded`, so feed readers can show the
//! clipped text without visiting the page.

mod rss;

pub use rss::{FeedBuilder, FeedConfig, FeedError};
