use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use super::Extractor;
use crate::clip::Article;
use crate::util::{html_to_text, validate_url, UrlValidationError};

const DEFAULT_BASE_URL: &str = "https://r.jina.ai";

const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out after 20s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Unexpected reader response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("Failed to render article text: {0}")]
    TextRendering(#[from] html2text::Error),
}

impl ContentError {
    /// Returns true if this error is transient and the request should be retried.
    fn is_retryable(&self) -> bool {
        match self {
            ContentError::Timeout | ContentError::Network(_) => true,
            ContentError::HttpStatus(status) => *status >= 500,
            ContentError::ResponseTooLarge(_)
            | ContentError::InvalidUtf8
            | ContentError::InvalidUrl(_)
            | ContentError::InsecureBaseUrl
            | ContentError::MalformedResponse(_)
            | ContentError::TextRendering(_) => false,
        }
    }
}

/// Envelope returned by the reader with `Accept: application/json`.
#[derive(Debug, Deserialize)]
struct ReaderResponse {
    data: ReaderPage,
}

#[derive(Debug, Deserialize)]
struct ReaderPage {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: String,
    #[serde(default, rename = "publishedTime")]
    published_time: Option<String>,
}

/// Extracts articles through the Jina reader (`https://r.jina.ai/<url>`).
///
/// The reader is asked for JSON with HTML content; the plain-text rendering
/// is derived locally.
pub struct JinaExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    retry_delay: Duration,
}

impl std::fmt::Debug for JinaExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinaExtractor")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl JinaExtractor {
    /// Create an extractor.
    ///
    /// `base_url` overrides the reader endpoint; it must be HTTPS unless it
    /// points at localhost.
    pub fn new(
        client: reqwest::Client,
        base_url: Option<&str>,
        api_key: Option<SecretString>,
    ) -> Result<Self, ContentError> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');

        // SEC-002: Enforce HTTPS for base URL to prevent API key exposure
        if !base.starts_with("https://") {
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS base URL (HTTPS required except for localhost)");
                return Err(ContentError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base, "Using non-HTTPS reader base URL (localhost only)");
        }

        Ok(Self {
            client,
            base_url: base.to_string(),
            api_key,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Base delay of the exponential retry backoff (1s by default).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Fetch with retry logic for transient failures.
    /// Uses exponential backoff: 1x, 2x, 4x the base delay (max 3 retries).
    async fn fetch_with_retry(&self, reader_url: &str) -> Result<String, ContentError> {
        let mut retry_count = 0;

        loop {
            match self.fetch(reader_url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && retry_count < MAX_RETRIES => {
                    let delay = self.retry_delay * (1u32 << retry_count);
                    tracing::debug!(
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying reader fetch after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch(&self, reader_url: &str) -> Result<String, ContentError> {
        let mut request = self
            .client
            .get(reader_url)
            .header("Accept", "application/json")
            .header("X-Return-Format", "html");

        // SEC-002: Only send API key to the official reader host
        if let Some(key) = &self.api_key {
            if self.base_url == DEFAULT_BASE_URL {
                request =
                    request.header("Authorization", format!("Bearer {}", key.expose_secret()));
            } else {
                tracing::debug!("Skipping API key for custom reader base URL");
            }
        }

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| ContentError::Timeout)?
            .map_err(ContentError::Network)?;

        if !response.status().is_success() {
            return Err(ContentError::HttpStatus(response.status().as_u16()));
        }

        read_limited_text(response, MAX_CONTENT_SIZE).await
    }
}

#[async_trait]
impl Extractor for JinaExtractor {
    async fn extract(&self, url: &str) -> Result<Article, ContentError> {
        // SEC-001: Validate URL before use to prevent SSRF attacks
        let target = validate_url(url)?;
        let reader_url = format!("{}/{}", self.base_url, target.as_str());

        let body = self.fetch_with_retry(&reader_url).await?;
        let page = serde_json::from_str::<ReaderResponse>(&body)?.data;

        tracing::debug!(url = %target, title = %page.title, "Extracted article");

        Ok(Article {
            title: page.title,
            byline: String::new(),
            excerpt: page.description,
            text_content: html_to_text(&page.content)?,
            html_content: page.content,
            published_at: page.published_time.as_deref().and_then(parse_published),
            modified_at: None,
        })
    }
}

/// The reader passes page metadata through as found: RFC 3339 or RFC 2822.
fn parse_published(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ContentError::Network)?;
        // SEC-003: Use saturating_add to prevent integer overflow in size check
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}
