//! Document ingestion service
//!
//! Validates uploaded documents (PDF, DOCX, plain text, images) against
//! signature, size and content checks, then extracts their text through a
//! bounded-concurrency batch runner with per-attempt timeout and retry.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
