use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Request-level failures. File-level problems are reported inside the
/// per-file records instead.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Malformed multipart request: {0}")]
    BadMultipart(String),

    #[error("No files were uploaded")]
    NoFiles,

    #[error("Too many files: {count} uploaded, at most {max} allowed")]
    TooManyFiles { count: usize, max: usize },

    #[error("Result not found")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadMultipart(_) | ApiError::NoFiles | ApiError::TooManyFiles { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
