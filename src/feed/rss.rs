use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

use crate::clip::Clip;

const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// RFC 1123 with a numeric zone, as RSS 2.0 expects.
const RSS_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to generate feed XML: {0}")]
    Xml(String),
}

/// Channel-level metadata.
#[derive(Debug, Clone, Default)]
pub struct FeedConfig {
    pub title: String,
    pub link: String,
    pub description: String,
    pub author_name: String,
    pub author_email: String,
    pub category: String,
    /// Creation time of the backing store; the feed's build date.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct FeedItem {
    url: String,
    title: String,
    author: String,
    excerpt: String,
    html_content: String,
    modified_at: DateTime<Utc>,
}

/// Collects clips and renders them as RSS.
///
/// Items keep insertion order; pass clips newest first.
#[derive(Debug, Clone)]
pub struct FeedBuilder {
    config: FeedConfig,
    items: Vec<FeedItem>,
    pub_date: DateTime<Utc>,
}

impl FeedBuilder {
    pub fn new(config: FeedConfig) -> Self {
        let pub_date = config.created_at;
        Self {
            config,
            items: Vec::new(),
            pub_date,
        }
    }

    /// Add a clip as the next item. The feed's `pubDate` tracks the latest
    /// `modified_at` seen.
    pub fn with_clip(&mut self, clip: &Clip) -> &mut Self {
        self.items.push(FeedItem {
            url: clip.url.clone(),
            title: clip.title.clone(),
            author: clip.author.clone(),
            excerpt: clip.excerpt.clone(),
            html_content: clip.html_content.clone(),
            modified_at: clip.modified_at,
        });
        if clip.modified_at > self.pub_date {
            self.pub_date = clip.modified_at;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_xml(&self) -> Result<Vec<u8>, FeedError> {
        let mut out = XmlOut::new();
        let config = &self.config;

        out.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        out.event(Event::Start(
            BytesStart::new("rss")
                .with_attributes([("version", "2.0"), ("xmlns:content", CONTENT_NS)]),
        ))?;
        out.start("channel")?;

        out.text_element("title", &config.title)?;
        out.text_element("link", &config.link)?;
        out.text_element("description", &config.description)?;
        if !config.author_name.is_empty() || !config.author_email.is_empty() {
            out.text_element(
                "managingEditor",
                &format!("{} ({})", config.author_name, config.author_email),
            )?;
        }
        out.text_element("pubDate", &rss_date(self.pub_date))?;
        out.text_element("lastBuildDate", &rss_date(config.created_at))?;
        if !config.category.is_empty() {
            out.text_element("category", &config.category)?;
        }
        out.text_element("copyright", &format!("Influss and {}", config.author_name))?;

        for item in &self.items {
            write_item(&mut out, item)?;
        }

        out.end("channel")?;
        out.end("rss")?;
        Ok(out.finish())
    }
}

fn write_item(out: &mut XmlOut, item: &FeedItem) -> Result<(), FeedError> {
    out.start("item")?;

    out.event(Event::Start(
        BytesStart::new("guid").with_attributes([("isPermaLink", "true")]),
    ))?;
    out.event(Event::Text(BytesText::new(&item.url)))?;
    out.end("guid")?;

    out.text_element("title", &item.title)?;
    out.text_element("link", &item.url)?;

    out.event(Event::Start(
        BytesStart::new("source").with_attributes([("url", item.url.as_str())]),
    ))?;
    out.event(Event::Text(BytesText::new(&item.url)))?;
    out.end("source")?;

    if !item.author.is_empty() {
        out.text_element("author", &item.author)?;
    }
    out.text_element("description", &item.excerpt)?;
    out.text_element("pubDate", &rss_date(item.modified_at))?;
    out.text_element("content:encoded", &item.html_content)?;

    out.end("item")
}

fn rss_date(ts: DateTime<Utc>) -> String {
    ts.format(RSS_DATE_FORMAT).to_string()
}

/// Thin wrapper so every write maps into `FeedError` the same way.
struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), FeedError> {
        self.writer
            .write_event(event)
            .map_err(|e| FeedError::Xml(e.to_string()))
    }

    fn start(&mut self, name: &str) -> Result<(), FeedError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), FeedError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), FeedError> {
        self.start(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

// ============================================================================
// Tests
// ============================================================================
