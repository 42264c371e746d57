//! Report photographs: loading, orientation fix and PNG/base64 encoding.

use std::io::Cursor;
use std::path::Path;

use base64::Engine as _;
use image::{DynamicImage, ImageOutputFormat};
use serde::Serialize;
use tracing::debug;

use super::ExtractionError;
use crate::models::ReportKind;

const MIN_IMAGE_BYTES: usize = 16;
const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// A raw uploaded photograph of one report sheet.
#[derive(Debug, Clone)]
pub struct ReportImage {
    kind: ReportKind,
    bytes: Vec<u8>,
    source: String,
}

/// A report image ready to be inlined into an extraction call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedImage {
    pub kind: ReportKind,
    pub mime_type: &'static str,
    /// Base64 (standard alphabet) PNG bytes.
    pub data: String,
}

impl ReportImage {
    pub fn new(kind: ReportKind, bytes: Vec<u8>, source: impl Into<String>) -> Self {
        Self {
            kind,
            bytes,
            source: source.into(),
        }
    }

    pub fn from_path(kind: ReportKind, path: &Path) -> Result<Self, ExtractionError> {
        let bytes = std::fs::read(path).map_err(|source| ExtractionError::ReadImage {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(kind, bytes, path.display().to_string()))
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode, fix EXIF orientation, re-encode as PNG and base64 encode.
    pub fn prepare(&self) -> Result<EncodedImage, ExtractionError> {
        validate_image_bytes(&self.bytes)?;

        let decoded = image::load_from_memory(&self.bytes).map_err(|e| {
            ExtractionError::ImageProcessing(format!("Cannot decode {}: {e}", self.source))
        })?;
        let oriented = apply_orientation(decoded, read_exif_orientation(&self.bytes));
        let png = encode_png(&oriented)?;

        debug!(
            kind = %self.kind,
            source = %self.source,
            input_bytes = self.bytes.len(),
            png_bytes = png.len(),
            "Prepared report image"
        );

        Ok(EncodedImage {
            kind: self.kind,
            mime_type: "image/png",
            data: base64::engine::general_purpose::STANDARD.encode(png),
        })
    }
}

/// The one or two sheets submitted together for a single patient.
#[derive(Debug, Clone, Default)]
pub struct ReportImages {
    pub hemogram: Option<ReportImage>,
    pub biochemistry: Option<ReportImage>,
}

impl ReportImages {
    pub fn is_empty(&self) -> bool {
        self.hemogram.is_none() && self.biochemistry.is_none()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Hemogram first, then biochemistry.
    pub fn iter(&self) -> impl Iterator<Item = &ReportImage> {
        self.hemogram.iter().chain(self.biochemistry.iter())
    }
}

/// Reject clearly invalid payloads before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation transform.
///
/// 1 = normal, 2 = mirrored, 3 = 180°, 4 = flipped vertically,
/// 5 = mirrored + 90° CW, 6 = 90° CW, 7 = mirrored + 270° CW, 8 = 270° CW.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}
