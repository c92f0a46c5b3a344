use std::time::Duration;

use serde::Deserialize;

use crate::services::batch::BatchConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Maximum jobs extracting at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Retries after the first failed attempt.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Per-attempt extraction budget in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// First retry delay; doubles per attempt up to `backoff_max_ms`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Request body limit for uploads.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_max_files_per_request")]
    pub max_files_per_request: usize,

    /// OCR results below this mean confidence (0-100) are rejected.
    #[serde(default = "default_ocr_min_confidence")]
    pub ocr_min_confidence: f32,

    /// HTTP OCR service; image extraction fails when unset.
    #[serde(default)]
    pub ocr_endpoint: Option<String>,

    #[serde(default)]
    pub ocr_api_token: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_concurrency() -> usize {
    3
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_max_files_per_request() -> usize {
    10
}

fn default_ocr_min_confidence() -> f32 {
    30.0
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_concurrency: self.max_concurrency.max(1),
            retry_attempts: self.retry_attempts,
            timeout: Duration::from_millis(self.timeout_ms),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_concurrency: default_max_concurrency(),
            retry_attempts: default_retry_attempts(),
            timeout_ms: default_timeout_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_upload_bytes: default_max_upload_bytes(),
            max_files_per_request: default_max_files_per_request(),
            ocr_min_confidence: default_ocr_min_confidence(),
            ocr_endpoint: None,
            ocr_api_token: None,
        }
    }
}
