use axum::extract::{Multipart, Path, State};
use axum::Json;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::extraction::{DeleteResponse, ExtractResponse, ExtractionRecord};
use crate::models::upload::UploadedFile;
use crate::routes::error::ApiError;

const FALLBACK_MIME: &str = "application/octet-stream";

/// POST /api/v1/extract — Upload one or more files (`file` fields) for text extraction.
pub async fn submit_extraction(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let max_files = state.config.max_files_per_request;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadMultipart(e.to_string()))?
    {
        if !matches!(field.name(), Some("file") | Some("files")) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field.content_type().unwrap_or(FALLBACK_MIME).to_string();
        let data: Bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadMultipart(e.to_string()))?;

        files.push(UploadedFile::new(filename, mime_type, data));
        if files.len() > max_files {
            return Err(ApiError::TooManyFiles {
                count: files.len(),
                max: max_files,
            });
        }
    }

    if files.is_empty() {
        return Err(ApiError::NoFiles);
    }

    info!(files = files.len(), "Extraction request received");
    let outcome = state.pipeline.run(files).await;

    for record in &outcome.records {
        state.store.insert(record.clone());
    }

    Ok(Json(ExtractResponse {
        batch: outcome.batch,
        results: outcome.records,
    }))
}

/// GET /api/v1/results — All stored results, newest first.
pub async fn list_results(State(state): State<AppState>) -> Json<Vec<ExtractionRecord>> {
    Json(state.store.list())
}

/// GET /api/v1/results/{id}
pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExtractionRecord>, ApiError> {
    state.store.get(id).map(Json).ok_or(ApiError::NotFound)
}

/// DELETE /api/v1/results/{id}
pub async fn delete_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if !state.store.delete(id) {
        return Err(ApiError::NotFound);
    }
    info!(id = %id, "Result deleted");
    Ok(Json(DeleteResponse { id, deleted: true }))
}
