//! Router configuration.

use axum::{routing::get, Router};

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/clips",
            get(handlers::render_feed).post(handlers::create_clip),
        )
        .with_state(state)
}
