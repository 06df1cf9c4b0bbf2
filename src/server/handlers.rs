//! Request handlers.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::clip::Clip;
use crate::content::ContentError;
use crate::feed::FeedBuilder;
use crate::util::validate_url;

const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

#[derive(Debug, Deserialize)]
pub struct ClipRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ClipResponse {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// `POST /clips`: extract the page at `url` and store it.
pub async fn create_clip(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ClipRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {e}"))
        }
    };

    let url = request.url.trim();
    if let Err(e) = validate_url(url) {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
    }

    let article = match state.extractor.extract(url).await {
        Ok(article) => article,
        Err(ContentError::InvalidUrl(e)) => {
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Article extraction failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to extract article");
        }
    };

    let clip = Clip::from_article(url, article);
    if let Err(e) = state.store.store(&clip).await {
        tracing::error!(url = %url, error = %e, "Failed to store clip");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to store clip");
    }

    tracing::info!(url = %clip.url, title = %clip.title, "Clipped article");
    (
        StatusCode::CREATED,
        Json(ClipResponse {
            url: clip.url,
            title: clip.title,
        }),
    )
        .into_response()
}

/// `GET /clips`: the most recent clips as an RSS feed.
pub async fn render_feed(State(state): State<AppState>) -> Response {
    let created_at = state.store.created_at().await;
    let clips = state.store.load(state.feed.items_limit).await;

    let mut builder = FeedBuilder::new(state.feed.to_feed_config(created_at));
    for clip in &clips {
        builder.with_clip(clip);
    }

    match builder.to_xml() {
        Ok(xml) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, RSS_CONTENT_TYPE)], xml).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to render feed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to render feed")
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Article;
    use crate::config::FeedSettings;
    use crate::content::Extractor;
    use crate::server::create_router;
    use crate::storage::{FsStore, Store, StoreError};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tower::ServiceExt;
    use tracing::Span;

    struct StubExtractor {
        fail: bool,
    }

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn extract(&self, url: &str) -> Result<Article, ContentError> {
            if self.fail {
                return Err(ContentError::HttpStatus(502));
            }
            Ok(Article {
                title: format!("Title of {url}"),
                html_content: "<p>Body</p>".to_string(),
                text_content: "Body".to_string(),
                ..Article::default()
            })
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn created_at(&self) -> DateTime<Utc> {
            DateTime::default()
        }

        async fn store(&self, _clip: &Clip) -> Result<(), StoreError> {
            Err(StoreError::Configuration("read-only".to_string()))
        }

        async fn load(&self, _limit: usize) -> Vec<Clip> {
            Vec::new()
        }
    }

    async fn fs_router(dir: &tempfile::TempDir, fail_extract: bool) -> Router {
        let store = FsStore::open(Span::none(), dir.path()).await.unwrap();
        router_with(Arc::new(store), fail_extract)
    }

    fn router_with(store: Arc<dyn Store>, fail_extract: bool) -> Router {
        let state = AppState::new(
            store,
            Arc::new(StubExtractor { fail: fail_extract }),
            FeedSettings::default(),
        );
        create_router(state)
    }

    fn post_clip(body: &str) -> Request<Body> {
        Request::post("/clips")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_feed() -> Request<Body> {
        Request::get("/clips").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_create_clip_stores_article() {
        let dir = tempfile::tempdir().unwrap();
        let app = fs_router(&dir, false).await;

        let response = app
            .clone()
            .oneshot(post_clip(r#"{"url": "https://example.com/post"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app.oneshot(get_feed()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/rss+xml; charset=utf-8"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let feed = feed_rs::parser::parse(body.as_ref()).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(
            feed.entries[0].title.as_ref().unwrap().content,
            "Title of https://example.com/post"
        );
    }

    #[tokio::test]
    async fn test_create_clip_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let app = fs_router(&dir, false).await;

        let response = app.oneshot(post_clip("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_clip_rejects_private_url() {
        let dir = tempfile::tempdir().unwrap();
        let app = fs_router(&dir, false).await;

        for url in ["http://127.0.0.1/admin", "ftp://example.com/file", "nonsense"] {
            let body = serde_json::json!({ "url": url }).to_string();
            let response = app.clone().oneshot(post_clip(&body)).await.unwrap();
            assert_eq!(
                response.status(),
                StatusCode::UNPROCESSABLE_ENTITY,
                "{url} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_extraction_failure_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = fs_router(&dir, true).await;

        let response = app
            .clone()
            .oneshot(post_clip(r#"{"url": "https://example.com/post"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // Nothing was stored
        let response = app.oneshot(get_feed()).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let feed = feed_rs::parser::parse(body.as_ref()).unwrap();
        assert!(feed.entries.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_server_error() {
        let app = router_with(Arc::new(BrokenStore), false);

        let response = app
            .oneshot(post_clip(r#"{"url": "https://example.com/post"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_feed_respects_items_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsStore::open(Span::none(), dir.path()).await.unwrap());
        let state = AppState::new(
            store,
            Arc::new(StubExtractor { fail: false }),
            FeedSettings {
                items_limit: 2,
                ..FeedSettings::default()
            },
        );
        let app = create_router(state);

        for i in 0..3 {
            let body = serde_json::json!({ "url": format!("https://example.com/{i}") }).to_string();
            let response = app.clone().oneshot(post_clip(&body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let response = app.oneshot(get_feed()).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let feed = feed_rs::parser::parse(body.as_ref()).unwrap();
        let links: Vec<&str> = feed
            .entries
            .iter()
            .map(|e| e.links[0].href.as_str())
            .collect();
        assert_eq!(links, vec!["https://example.com/2", "https://example.com/1"]);
    }
}
