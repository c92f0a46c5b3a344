use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::GenericImageView;
use tracing::debug;

use super::{Extraction, ExtractionError, Extractor};
use crate::models::upload::{MIME_JPEG, MIME_JPG, MIME_PNG};
use crate::services::ocr::OcrEngine;

/// Images smaller than this on either side carry no legible text.
const MIN_DIMENSION: u32 = 8;

/// Raster images: decoded locally to make sure they are readable, then
/// handed to the configured OCR engine.
pub struct ImageExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
    min_confidence: f32,
}

impl ImageExtractor {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>, min_confidence: f32) -> Self {
        Self {
            ocr,
            min_confidence,
        }
    }
}

fn decode_dimensions(bytes: &[u8]) -> Result<(u32, u32), ExtractionError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ExtractionError::Parse(format!("unreadable image: {}", e)))?;
    Ok(img.dimensions())
}

#[async_trait]
impl Extractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image-ocr"
    }

    fn supported_mime_types(&self) -> &'static [&'static str] {
        &[MIME_PNG, MIME_JPEG, MIME_JPG]
    }

    async fn extract(&self, bytes: Bytes) -> Result<Extraction, ExtractionError> {
        let Some(ocr) = &self.ocr else {
            return Err(ExtractionError::Ocr("no OCR engine configured".to_string()));
        };

        let decode_input = bytes.clone();
        let (width, height) = tokio::task::spawn_blocking(move || decode_dimensions(&decode_input))
            .await
            .map_err(|e| ExtractionError::Parse(format!("image decoding task failed: {}", e)))??;

        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(ExtractionError::Parse(format!(
                "image is too small for OCR ({}x{})",
                width, height
            )));
        }

        let output = ocr.recognize(&bytes).await?;
        debug!(
            engine = ocr.name(),
            width,
            height,
            confidence = output.confidence,
            "OCR finished"
        );

        if output.confidence.is_nan() || output.confidence < self.min_confidence {
            return Err(ExtractionError::LowConfidence {
                confidence: output.confidence,
                threshold: self.min_confidence,
            });
        }

        let mut extraction = Extraction::parsed(output.text)?;
        extraction.confidence = Some(output.confidence);
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ocr::OcrOutput;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    struct FixedOcr(OcrOutput);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn recognize(&self, _image_bytes: &[u8]) -> Result<OcrOutput, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    fn png(width: u32, height: u32) -> Bytes {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb([255, 255, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }

    fn extractor(text: &str, confidence: f32) -> ImageExtractor {
        let engine = FixedOcr(OcrOutput {
            text: text.to_string(),
            confidence,
        });
        ImageExtractor::new(Some(Arc::new(engine)), 30.0)
    }

    #[tokio::test]
    async fn test_confident_ocr_is_returned() {
        let out = extractor("INVOICE 42", 91.5).extract(png(64, 32)).await.unwrap();
        assert_eq!(out.text, "INVOICE 42");
        assert_eq!(out.confidence, Some(91.5));
    }

    #[tokio::test]
    async fn test_low_confidence_fails() {
        let err = extractor("g4rbl3d", 12.0).extract(png(64, 32)).await.unwrap_err();
        assert!(matches!(err, ExtractionError::LowConfidence { .. }));
        assert!(err.to_string().contains("12.0%"));
    }

    #[tokio::test]
    async fn test_nan_confidence_fails() {
        let err = extractor("INVOICE 42", f32::NAN).extract(png(64, 32)).await.unwrap_err();
        assert!(matches!(err, ExtractionError::LowConfidence { .. }));
    }

    #[tokio::test]
    async fn test_missing_engine_fails() {
        let err = ImageExtractor::new(None, 30.0)
            .extract(png(64, 32))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Ocr(_)));
    }

    #[tokio::test]
    async fn test_corrupt_image_fails() {
        let bytes = Bytes::from_static(&[0x89, 0x50, 0x4E, 0x47, 0x00, 0x01, 0x02]);
        let err = extractor("x", 99.0).extract(bytes).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));
    }

    #[tokio::test]
    async fn test_tiny_image_fails() {
        let err = extractor("x", 99.0).extract(png(4, 4)).await.unwrap_err();
        assert!(err.to_string().contains("too small"));
    }
}
