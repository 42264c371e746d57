use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use super::request::ExtractionRequest;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Cannot reach vision service at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    Transport(String),

    #[error("Vision service returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Vision service returned an empty reply")]
    EmptyReply,

    #[error("Unexpected vision service response: {0}")]
    Decode(String),
}

impl VisionError {
    /// Map a reqwest failure, keeping connection errors distinct.
    pub(crate) fn from_reqwest(err: reqwest::Error, base_url: &str) -> Self {
        if err.is_connect() {
            VisionError::Connection(base_url.to_string())
        } else {
            VisionError::Transport(err.to_string())
        }
    }
}

/// A vision-capable model that reads lab report images (allows mocking).
pub trait VisionClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send one extraction request; returns the free-form reply text.
    fn extract(&self, request: &ExtractionRequest) -> Result<String, VisionError>;
}

/// Mock vision client for testing. Returns a fixed reply and counts calls.
pub struct MockVisionClient {
    reply: String,
    model_name: String,
    calls: AtomicUsize,
}

impl MockVisionClient {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            model_name: "mock-vision".to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VisionClient for MockVisionClient {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn extract(&self, _request: &ExtractionRequest) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reply.trim().is_empty() {
            return Err(VisionError::EmptyReply);
        }
        Ok(self.reply.clone())
    }
}

/// Shared response check for HTTP-backed clients.
pub(crate) fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, VisionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(VisionError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
