use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod analyze;
pub mod health;
pub mod metrics;
pub mod workers;

/// Upload size cap for `/api/v1/analyze`.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Build the full HTTP + WebSocket router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/api/v1/analyze", post(analyze::analyze_image))
        .route("/api/v1/workers", get(workers::worker_status))
        .route("/ws", get(workers::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
}
