//! Article extraction.
//!
//! The rest of the system only sees the [`Extractor`] trait: give it a URL,
//! get back an [`Article`](crate::clip::Article). [`JinaExtractor`] is the
//! default implementation, backed by the Jina reader API.

mod jina;

use async_trait::async_trait;

use crate::clip::Article;

pub use jina::{ContentError, JinaExtractor};

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch `url` and extract its readable article.
    async fn extract(&self, url: &str) -> Result<Article, ContentError>;
}
