use serde::Serialize;

use super::prompt::build_extraction_instruction;
use super::report_image::{EncodedImage, ReportImage, ReportImages};
use super::ExtractionError;

/// One extraction call: the instruction plus the inline image payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRequest {
    pub instruction: String,
    pub images: Vec<EncodedImage>,
}

impl ExtractionRequest {
    /// Build a request from the submitted sheets.
    ///
    /// At least one image is required; an empty submission fails with
    /// [`ExtractionError::NoInput`] before any image is touched.
    pub fn build(images: &ReportImages) -> Result<Self, ExtractionError> {
        if images.is_empty() {
            return Err(ExtractionError::NoInput);
        }

        let encoded = images
            .iter()
            .map(ReportImage::prepare)
            .collect::<Result<Vec<_>, _>>()?;
        let kinds: Vec<_> = encoded.iter().map(|image| image.kind).collect();

        Ok(Self {
            instruction: build_extraction_instruction(&kinds),
            images: encoded,
        })
    }
}
