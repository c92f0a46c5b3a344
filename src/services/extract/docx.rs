use std::io::{Cursor, Read};

use async_trait::async_trait;
use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use super::{Extraction, ExtractionError, Extractor};
use crate::models::upload::MIME_DOCX;

const DOCUMENT_PART: &str = "word/document.xml";

/// Word documents: the main document part streamed with `quick-xml`.
/// Paragraph ends become newlines; tabs and breaks are kept.
pub struct DocxExtractor;

fn read_document_xml(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::Parse(format!("invalid DOCX archive: {}", e)))?;

    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| ExtractionError::Parse(format!("missing {}", DOCUMENT_PART)))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| ExtractionError::Parse(format!("unreadable {}: {}", DOCUMENT_PART, e)))?;
    Ok(xml)
}

fn document_text(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let chunk = t
                    .unescape()
                    .map_err(|e| ExtractionError::Parse(format!("malformed XML text: {}", e)))?;
                text.push_str(&chunk);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::Parse(format!(
                    "malformed XML at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(text)
}

#[async_trait]
impl Extractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn supported_mime_types(&self) -> &'static [&'static str] {
        &[MIME_DOCX]
    }

    async fn extract(&self, bytes: Bytes) -> Result<Extraction, ExtractionError> {
        let text = tokio::task::spawn_blocking(move || {
            let xml = read_document_xml(&bytes)?;
            document_text(&xml)
        })
        .await
        .map_err(|e| ExtractionError::Parse(format!("DOCX parsing task failed: {}", e)))??;

        Extraction::parsed(text)
    }
}
