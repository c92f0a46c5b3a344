use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// Register descriptions for every metric the service records.
pub fn describe_metrics() {
    metrics::describe_counter!("extraction_jobs_total", "Extraction jobs queued");
    metrics::describe_counter!("extraction_jobs_completed", "Extraction jobs completed");
    metrics::describe_counter!(
        "extraction_jobs_failed",
        "Extraction jobs failed after exhausting retries"
    );
    metrics::describe_counter!("extraction_job_retries", "Extraction attempts retried");
    metrics::describe_counter!(
        "upload_validation_rejections",
        "Uploads rejected before extraction, by rejection kind"
    );
    metrics::describe_histogram!(
        "extraction_processing_seconds",
        "Duration of the successful extraction attempt"
    );
}

/// GET /metrics — Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
