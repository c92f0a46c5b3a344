use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use crate::services::extract::ExtractionError;

/// Recognised text and the engine's mean confidence (0-100).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
}

/// Pluggable OCR backend used by the image extractor.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recognize(&self, image_bytes: &[u8]) -> Result<OcrOutput, ExtractionError>;
}

/// Client for an HTTP OCR service that accepts a base64 image and answers
/// with `{"result": {"text": ..., "confidence": ...}}`.
pub struct RemoteOcrEngine {
    http: Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Deserialize)]
struct OcrResponse {
    result: OcrOutput,
}

impl RemoteOcrEngine {
    pub fn new(endpoint: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            api_token,
        }
    }
}

#[async_trait]
impl OcrEngine for RemoteOcrEngine {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn recognize(&self, image_bytes: &[u8]) -> Result<OcrOutput, ExtractionError> {
        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image_bytes),
            "language": "eng",
        });

        let mut request = self.http.post(&self.endpoint).json(&request_body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ExtractionError::Ocr(format!("request failed: {}", e)))?;

        let body: OcrResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Ocr(format!("unreadable response: {}", e)))?;

        Ok(body.result)
    }
}
