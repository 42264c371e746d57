//! CLI commands. Each command validates its configuration before doing any
//! work, then drives one pipeline and prints the result on stdout.

pub mod analyze;
pub mod ingest;
pub mod sheet;

use thiserror::Error;

use crate::config::ConfigError;
use crate::models::AgeError;
use crate::pipeline::extraction::{ExtractionError, VisionError};
use crate::pipeline::{AnalysisError, IngestError};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Vision client setup failed: {0}")]
    Vision(#[from] VisionError),

    #[error("Sheet error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid age: {0}")]
    Age(#[from] AgeError),

    #[error("Invalid correction {input:?}: {reason}")]
    InvalidCorrection { input: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CommandError {
    /// The model reply behind an unparseable-reply failure, for display.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            CommandError::Ingest(IngestError::Extraction(ExtractionError::Unparseable {
                raw,
                ..
            }))
            | CommandError::Extraction(ExtractionError::Unparseable { raw, .. }) => Some(raw.as_str()),
            _ => None,
        }
    }
}

/// Raw values print as stored; missing prints as `-`.
pub(crate) fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Computed values print with two decimals.
pub(crate) fn fmt_stat(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}
