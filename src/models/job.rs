use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an extraction job tracked by the batch processor.
///
/// Transitions only move forward: `Pending -> Processing -> Completed | Failed`.
/// A retry keeps the job in `Processing`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One file's extraction task.
///
/// `result` is set iff the job completed and `error` iff it failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job<P> {
    pub id: String,
    pub payload: P,
    pub status: JobStatus,
    pub progress: u8,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl<P> Job<P> {
    pub fn new(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
            status: JobStatus::Pending,
            progress: 0,
            attempts: 0,
            started_at: None,
            ended_at: None,
            result: None,
            error: None,
        }
    }

    /// Wall-clock time between the last attempt's start and the terminal state.
    pub fn processing_time_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
