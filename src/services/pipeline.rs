use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::models::extraction::ExtractionRecord;
use crate::models::upload::UploadedFile;
use crate::services::batch::{
    BatchConfig, BatchError, BatchObserver, BatchProcessor, BatchStatistics, ProgressReporter,
};
use crate::services::extract::{ExtractionError, ExtractorRegistry};
use crate::services::validation;

/// Result of pushing a set of uploads through validation and extraction.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// `None` when every upload was rejected and no batch ran.
    pub batch: Option<BatchStatistics>,
    /// One record per upload, in upload order.
    pub records: Vec<ExtractionRecord>,
}

enum Slot {
    Done(ExtractionRecord),
    Queued(Uuid),
}

/// Validates uploads, queues the accepted ones on a fresh batch processor,
/// and extracts them with the registry's per-format extractor.
pub struct ExtractionPipeline {
    registry: Arc<ExtractorRegistry>,
    batch_config: BatchConfig,
}

impl ExtractionPipeline {
    pub fn new(registry: Arc<ExtractorRegistry>, batch_config: BatchConfig) -> Self {
        Self {
            registry,
            batch_config,
        }
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub async fn run(&self, files: Vec<UploadedFile>) -> PipelineOutcome {
        self.run_observed(files, None).await
    }

    pub async fn run_observed(
        &self,
        files: Vec<UploadedFile>,
        observer: Option<Arc<dyn BatchObserver<UploadedFile>>>,
    ) -> PipelineOutcome {
        let processor = match observer {
            Some(observer) => BatchProcessor::with_observer(self.batch_config.clone(), observer),
            None => BatchProcessor::new(self.batch_config.clone()),
        };

        let mut slots = Vec::with_capacity(files.len());
        for file in files {
            let id = Uuid::new_v4();
            let verdict = validation::validate_upload(&file);
            if !verdict.accepted {
                slots.push(Slot::Done(ExtractionRecord::rejected(id, &file, &verdict)));
                continue;
            }

            match processor.add_job(id.to_string(), file) {
                Ok(()) => slots.push(Slot::Queued(id)),
                Err(e) => warn!(job_id = %id, error = %e, "Could not queue upload"),
            }
        }

        let registry = Arc::clone(&self.registry);
        let batch = match processor
            .process_batch(move |file: UploadedFile, progress: ProgressReporter| {
                let registry = Arc::clone(&registry);
                async move {
                    let extractor = registry.for_mime(&file.mime_type)?;
                    progress.report(10.0);
                    let extraction = extractor.extract(file.bytes).await?;
                    progress.report(90.0);
                    Ok::<String, ExtractionError>(extraction.text)
                }
            })
            .await
        {
            Ok(stats) => Some(stats),
            Err(BatchError::EmptyBatch) => {
                info!("No accepted uploads, skipping extraction");
                None
            }
            Err(e) => {
                warn!(error = %e, "Extraction batch did not run");
                None
            }
        };

        let records = slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Done(record) => Some(record),
                Slot::Queued(id) => processor
                    .job(&id.to_string())
                    .map(|job| ExtractionRecord::from_job(id, &job)),
            })
            .collect();

        PipelineOutcome { batch, records }
    }
}
