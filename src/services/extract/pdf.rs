use async_trait::async_trait;
use bytes::Bytes;
use lopdf::Document;
use tracing::debug;

use super::{Extraction, ExtractionError, Extractor};
use crate::models::upload::MIME_PDF;

/// PDF text layer via `lopdf`. Scanned PDFs without a text layer come back
/// as [`ExtractionError::EmptyOutput`].
pub struct PdfExtractor;

fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let document = Document::load_mem(bytes)
        .map_err(|e| ExtractionError::Parse(format!("invalid PDF: {}", e)))?;

    if document.is_encrypted() {
        return Err(ExtractionError::Parse(
            "encrypted PDFs are not supported".to_string(),
        ));
    }

    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err(ExtractionError::Parse("PDF has no pages".to_string()));
    }

    debug!(pages = pages.len(), "Extracting PDF text layer");
    document
        .extract_text(&pages)
        .map_err(|e| ExtractionError::Parse(format!("failed to read PDF text: {}", e)))
}

#[async_trait]
impl Extractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supported_mime_types(&self) -> &'static [&'static str] {
        &[MIME_PDF]
    }

    async fn extract(&self, bytes: Bytes) -> Result<Extraction, ExtractionError> {
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(|e| ExtractionError::Parse(format!("PDF parsing task failed: {}", e)))??;
        Extraction::parsed(text)
    }
}
