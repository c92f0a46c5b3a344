use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    extract::ExtractorRegistry,
    ocr::{OcrEngine, RemoteOcrEngine},
    pipeline::ExtractionPipeline,
    store::ResultStore,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<ResultStore>,
    pub pipeline: Arc<ExtractionPipeline>,
}

impl AppState {
    pub fn new(config: AppConfig, registry: ExtractorRegistry) -> Self {
        let pipeline = ExtractionPipeline::new(Arc::new(registry), config.batch_config());
        Self {
            config: Arc::new(config),
            store: Arc::new(ResultStore::new()),
            pipeline: Arc::new(pipeline),
        }
    }

    /// State with the default extractors, using the remote OCR engine when
    /// `ocr_endpoint` is configured.
    pub fn from_config(config: AppConfig) -> Self {
        let registry = default_registry(&config);
        Self::new(config, registry)
    }
}

pub fn default_registry(config: &AppConfig) -> ExtractorRegistry {
    let ocr = config.ocr_endpoint.as_ref().map(|endpoint| {
        Arc::new(RemoteOcrEngine::new(endpoint.clone(), config.ocr_api_token.clone()))
            as Arc<dyn OcrEngine>
    });
    ExtractorRegistry::with_defaults(ocr, config.ocr_min_confidence)
}
