//! Per-format text extraction behind a common [`Extractor`] trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::models::upload::{MIME_DOCX, MIME_JPEG, MIME_JPG, MIME_PDF, MIME_PNG, MIME_TEXT};
use crate::services::ocr::OcrEngine;

pub mod docx;
pub mod image;
pub mod pdf;
pub mod text;

pub use docx::DocxExtractor;
pub use image::ImageExtractor;
pub use pdf::PdfExtractor;
pub use text::TextExtractor;

/// Text pulled out of a document, with an engine confidence when the format
/// is recognised rather than parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub confidence: Option<f32>,
}

impl Extraction {
    pub fn parsed(text: String) -> Result<Self, ExtractionError> {
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyOutput);
        }
        Ok(Self {
            text,
            confidence: None,
        })
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_mime_types(&self) -> &'static [&'static str];

    async fn extract(&self, bytes: Bytes) -> Result<Extraction, ExtractionError>;
}

/// Maps declared MIME types to the extractor that handles them.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    by_mime: HashMap<&'static str, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text, PDF, DOCX and image extractors. Images go through `ocr`.
    pub fn with_defaults(ocr: Option<Arc<dyn OcrEngine>>, ocr_min_confidence: f32) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextExtractor));
        registry.register(Arc::new(PdfExtractor));
        registry.register(Arc::new(DocxExtractor));
        registry.register(Arc::new(ImageExtractor::new(ocr, ocr_min_confidence)));
        registry
    }

    /// Register an extractor for every MIME type it supports, replacing any
    /// previous handler for those types.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        for mime in extractor.supported_mime_types() {
            self.by_mime.insert(*mime, Arc::clone(&extractor));
        }
    }

    pub fn for_mime(&self, mime_type: &str) -> Result<Arc<dyn Extractor>, ExtractionError> {
        self.by_mime
            .get(mime_type)
            .cloned()
            .ok_or_else(|| ExtractionError::Unsupported(mime_type.to_string()))
    }

    /// Names of registered extractors, deduplicated and sorted.
    pub fn extractor_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.by_mime.values().map(|e| e.name()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn supports(&self, mime_type: &str) -> bool {
        self.by_mime.contains_key(mime_type)
    }
}

/// Every MIME type the default registry understands.
pub const SUPPORTED_MIME_TYPES: &[&str] =
    &[MIME_PDF, MIME_PNG, MIME_JPEG, MIME_JPG, MIME_DOCX, MIME_TEXT];

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("No extractor registered for {0}")]
    Unsupported(String),

    #[error("Failed to parse document: {0}")]
    Parse(String),

    #[error("OCR confidence too low ({confidence:.1}%, minimum {threshold:.1}%)")]
    LowConfidence { confidence: f32, threshold: f32 },

    #[error("No text could be extracted from the document")]
    EmptyOutput,

    #[error("OCR failed: {0}")]
    Ocr(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_supported_types() {
        let registry = ExtractorRegistry::with_defaults(None, 30.0);
        for mime in SUPPORTED_MIME_TYPES {
            assert!(registry.supports(mime), "{} should be supported", mime);
        }
        assert_eq!(
            registry.extractor_names(),
            vec!["docx", "image-ocr", "pdf", "text"]
        );
    }

    #[test]
    fn test_unknown_mime_is_unsupported() {
        let registry = ExtractorRegistry::with_defaults(None, 30.0);
        let err = registry.for_mime("application/zip").err().unwrap();
        assert!(matches!(err, ExtractionError::Unsupported(ref m) if m == "application/zip"));
        assert_eq!(err.to_string(), "No extractor registered for application/zip");
    }

    #[test]
    fn test_blank_output_rejected() {
        assert!(matches!(
            Extraction::parsed("  \n\t ".to_string()),
            Err(ExtractionError::EmptyOutput)
        ));
        assert_eq!(Extraction::parsed("hi".to_string()).unwrap().text, "hi");
    }
}
