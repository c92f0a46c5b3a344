use async_trait::async_trait;
use bytes::Bytes;

use super::{Extraction, ExtractionError, Extractor};
use crate::models::upload::MIME_TEXT;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Plain text: lossy UTF-8 decode with the byte-order mark stripped.
pub struct TextExtractor;

#[async_trait]
impl Extractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supported_mime_types(&self) -> &'static [&'static str] {
        &[MIME_TEXT]
    }

    async fn extract(&self, bytes: Bytes) -> Result<Extraction, ExtractionError> {
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);
        let text = String::from_utf8_lossy(body).replace("\r\n", "\n");
        Extraction::parsed(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_bom_and_normalizes_newlines() {
        let bytes = Bytes::from_static(b"\xEF\xBB\xBFline one\r\nline two\r\n");
        let out = tokio_test::block_on(TextExtractor.extract(bytes)).unwrap();
        assert_eq!(out.text, "line one\nline two\n");
        assert_eq!(out.confidence, None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let bytes = Bytes::from_static(b"caf\xE9 menu");
        let out = tokio_test::block_on(TextExtractor.extract(bytes)).unwrap();
        assert_eq!(out.text, "caf\u{FFFD} menu");
    }

    #[test]
    fn test_whitespace_only_fails() {
        let result = tokio_test::block_on(TextExtractor.extract(Bytes::from_static(b"   \n")));
        assert!(matches!(result, Err(ExtractionError::EmptyOutput)));
    }
}
