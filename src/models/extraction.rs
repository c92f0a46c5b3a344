use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{Job, JobStatus};
use crate::models::upload::UploadedFile;
use crate::models::verdict::ValidationVerdict;
use crate::services::batch::BatchStatistics;

/// Terminal outcome of one uploaded file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Completed,
    Failed,
    Rejected,
}

/// Stored result for one uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub word_count: usize,
    pub character_count: usize,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ExtractionRecord {
    /// Record for an upload the validator refused; the verdict reason is kept verbatim.
    pub fn rejected(id: Uuid, file: &UploadedFile, verdict: &ValidationVerdict) -> Self {
        Self {
            id,
            filename: file.filename.clone(),
            mime_type: file.mime_type.clone(),
            size: file.size,
            status: RecordStatus::Rejected,
            text: None,
            error: verdict.reason.clone(),
            word_count: 0,
            character_count: 0,
            attempts: 0,
            processing_time_ms: None,
            created_at: Utc::now(),
        }
    }

    /// Record for a job that reached a terminal state.
    pub fn from_job(id: Uuid, job: &Job<UploadedFile>) -> Self {
        let status = match job.status {
            JobStatus::Completed => RecordStatus::Completed,
            _ => RecordStatus::Failed,
        };
        let (word_count, character_count) = job
            .result
            .as_deref()
            .map(|text| (text.split_whitespace().count(), text.chars().count()))
            .unwrap_or((0, 0));

        Self {
            id,
            filename: job.payload.filename.clone(),
            mime_type: job.payload.mime_type.clone(),
            size: job.payload.size,
            status,
            text: job.result.clone(),
            error: job.error.clone(),
            word_count,
            character_count,
            attempts: job.attempts,
            processing_time_ms: job.processing_time_ms(),
            created_at: job.ended_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Response after submitting files for extraction.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchStatistics>,
    pub results: Vec<ExtractionRecord>,
}

/// Response after deleting a stored result.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub id: Uuid,
    pub deleted: bool,
}
