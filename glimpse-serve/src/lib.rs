//! HTTP surface for the captioning and action recognition models.

/// Request handlers and response bodies.
pub mod api;

/// Request errors and their HTTP responses.
pub mod error;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use glimpse_models::InferenceContext;
use tower_http::cors::CorsLayer;

/// Build the application router around a loaded inference context.
///
/// # Arguments
///
/// * `ctx` - The models shared by every request.
/// * `max_upload_bytes` - The largest accepted request body.
pub fn app(ctx: Arc<InferenceContext>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(api::index))
        .route("/health", get(api::health))
        .route("/api/caption", post(api::caption))
        .route("/api/action", post(api::action))
        .route("/api/combined", post(api::combined))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
