use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use doc_ingest::{
    app_state::default_registry,
    config::AppConfig,
    models::extraction::{ExtractionRecord, RecordStatus},
    models::job::Job,
    models::upload::{mime_from_filename, UploadedFile},
    services::batch::{BatchObserver, BatchStatistics},
    services::pipeline::ExtractionPipeline,
};

const FALLBACK_MIME: &str = "application/octet-stream";

/// Logs per-job progress and running totals.
struct ProgressLogger;

impl BatchObserver<UploadedFile> for ProgressLogger {
    fn on_progress(&self, job: &Job<UploadedFile>, stats: &BatchStatistics) {
        tracing::debug!(
            file = %job.payload.filename,
            attempt = job.attempts,
            progress = job.progress,
            completed = stats.completed,
            failed = stats.failed,
            total = stats.total,
            "Progress"
        );
    }

    fn on_job_complete(&self, job: &Job<UploadedFile>) {
        tracing::info!(file = %job.payload.filename, attempts = job.attempts, "Extracted");
    }

    fn on_job_error(&self, job: &Job<UploadedFile>, error: &str) {
        tracing::warn!(file = %job.payload.filename, error = %error, "Extraction failed");
    }
}

#[derive(Serialize)]
struct Report {
    batch: Option<BatchStatistics>,
    results: Vec<ExtractionRecord>,
}

fn load(path: &Path) -> std::io::Result<UploadedFile> {
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = mime_from_filename(&filename).unwrap_or(FALLBACK_MIME);
    Ok(UploadedFile::new(filename, mime_type, Bytes::from(bytes)))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: batch <file>...");
        return ExitCode::from(2);
    }

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        match load(Path::new(path)) {
            Ok(file) => files.push(file),
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Could not read file");
                return ExitCode::FAILURE;
            }
        }
    }

    let pipeline = ExtractionPipeline::new(Arc::new(default_registry(&config)), config.batch_config());
    let outcome = pipeline
        .run_observed(files, Some(Arc::new(ProgressLogger)))
        .await;

    let all_ok = outcome
        .records
        .iter()
        .all(|r| r.status == RecordStatus::Completed);

    let report = Report {
        batch: outcome.batch,
        results: outcome.records,
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            tracing::error!(error = %e, "Could not serialize report");
            return ExitCode::FAILURE;
        }
    }

    if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
