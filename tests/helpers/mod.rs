//! Test helper utilities for driving the router in-process

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde::de::DeserializeOwned;
use tower::ServiceExt;

use doc_ingest::app_state::AppState;
use doc_ingest::config::AppConfig;
use doc_ingest::routes;
use doc_ingest::services::extract::{ExtractionError, ExtractorRegistry};
use doc_ingest::services::ocr::{OcrEngine, OcrOutput};

use crate::fixtures::TestDocument;

const BOUNDARY: &str = "doc-ingest-test-boundary";
const RESPONSE_LIMIT: usize = 16 * 1024 * 1024;

/// OCR engine returning a canned result.
pub struct StubOcr {
    pub text: &'static str,
    pub confidence: f32,
}

#[async_trait]
impl OcrEngine for StubOcr {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn recognize(&self, _image_bytes: &[u8]) -> Result<OcrOutput, ExtractionError> {
        Ok(OcrOutput {
            text: self.text.to_string(),
            confidence: self.confidence,
        })
    }
}

pub fn stub_registry(confidence: f32) -> ExtractorRegistry {
    let ocr: Arc<dyn OcrEngine> = Arc::new(StubOcr {
        text: "SCANNED RECEIPT 19.99",
        confidence,
    });
    ExtractorRegistry::with_defaults(Some(ocr), 30.0)
}

/// Config with short retry delays so failing uploads settle quickly.
pub fn test_config() -> AppConfig {
    AppConfig {
        retry_attempts: 1,
        timeout_ms: 5_000,
        backoff_base_ms: 10,
        backoff_max_ms: 20,
        ..AppConfig::default()
    }
}

/// Router plus a handle on its state for inspecting the store.
pub fn test_app(config: AppConfig) -> (Router, AppState) {
    let state = AppState::new(config, stub_registry(88.0));
    (routes::api_router(state.clone()), state)
}

/// Encode documents as `multipart/form-data` under the given field name.
pub fn multipart_body(field: &str, documents: &[TestDocument]) -> Vec<u8> {
    let mut body = Vec::new();
    for doc in documents {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, doc.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", doc.mime_type).as_bytes());
        body.extend_from_slice(&doc.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(documents: &[TestDocument]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/extract")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body("file", documents)))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Send one request and decode the JSON body.
pub async fn send_json<T: DeserializeOwned>(app: &Router, request: Request<Body>) -> (StatusCode, T) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), RESPONSE_LIMIT).await.unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, String::from_utf8_lossy(&bytes)));
    (status, value)
}
