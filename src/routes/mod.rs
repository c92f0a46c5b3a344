pub mod error;
pub mod extract;
pub mod health;
pub mod metrics;

use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// API routes without the Prometheus endpoint, which needs its own state.
pub fn api_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/extract", axum::routing::post(extract::submit_extraction))
        .route("/api/v1/results", get(extract::list_results))
        .route(
            "/api/v1/results/{id}",
            get(extract::get_result).delete(extract::delete_result),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(axum::extract::DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
}
