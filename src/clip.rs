//! The clip: one saved article, as handed from extraction to storage.

use chrono::{DateTime, Utc};

/// A normalized, extracted article.
///
/// Clips are built once from an [`Article`] and never mutated afterwards;
/// stores only write and read whole clips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pub url: String,
    pub title: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub excerpt: String,
    pub html_content: String,
    /// Plain-text rendering. Only the file-system store persists it (as a
    /// sidecar file) and no store loads it back.
    pub plain_text_content: String,
}

/// What an extractor returns for a single page.
#[derive(Debug, Clone, Default)]
pub struct Article {
    pub title: String,
    pub byline: String,
    pub excerpt: String,
    pub html_content: String,
    pub text_content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Clip {
    /// Build a clip from an extracted article.
    ///
    /// Missing timestamps default to the moment of extraction.
    pub fn from_article(url: impl Into<String>, article: Article) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            title: article.title,
            author: article.byline,
            published_at: article.published_at.unwrap_or(now),
            modified_at: article.modified_at.unwrap_or(now),
            excerpt: article.excerpt,
            html_content: article.html_content,
            plain_text_content: article.text_content,
        }
    }
}
