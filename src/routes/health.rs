use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub extractors: Vec<String>,
    pub ocr_configured: bool,
    pub stored_results: usize,
}

/// GET /health — liveness plus the extraction capabilities on offer.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let extractors = state
        .pipeline
        .registry()
        .extractor_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            extractors,
            ocr_configured: state.config.ocr_endpoint.is_some(),
            stored_results: state.store.len(),
        },
    })
}
