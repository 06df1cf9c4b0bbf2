//! HTTP API.
//!
//! - `POST /clips` with `{"url": "..."}` extracts the page and stores it
//! - `GET /clips` renders the most recent clips as RSS

mod handlers;
mod routes;

pub use routes::create_router;

use std::sync::Arc;

use crate::config::FeedSettings;
use crate::content::Extractor;
use crate::storage::Store;

/// Shared state for the request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub extractor: Arc<dyn Extractor>,
    pub feed: Arc<FeedSettings>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, extractor: Arc<dyn Extractor>, feed: FeedSettings) -> Self {
        Self {
            store,
            extractor,
            feed: Arc::new(feed),
        }
    }
}

/// Serve the API on `listen_addr` until Ctrl-C.
pub async fn serve(listen_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutting down");
}
