pub mod gemini;
pub mod ollama;
pub mod parser;
pub mod prompt;
pub mod report_image;
pub mod request;
pub mod vision;

pub use gemini::GeminiClient;
pub use ollama::OllamaVisionClient;
pub use parser::{parse_extraction_reply, ParsedReply};
pub use report_image::{EncodedImage, ReportImage, ReportImages};
pub use request::ExtractionRequest;
pub use vision::{MockVisionClient, VisionClient, VisionError};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("No report image was supplied")]
    NoInput,

    #[error("Cannot read image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Model reply could not be parsed: {reason}")]
    Unparseable { reason: String, raw: String },
}
