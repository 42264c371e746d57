//! Ingestion: report images → vision call → draft → one appended row.
//!
//! Extraction and saving are separate steps so the operator can review and
//! correct the draft. A draft is never modified in place; corrections
//! produce a new draft.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::extraction::{
    parse_extraction_reply, ExtractionError, ExtractionRequest, ReportImages, VisionClient,
    VisionError,
};
use super::indices::{compute_indices, DerivedIndices};
use crate::models::{LabField, LabRecord, PatientAge, SchemaVersion};
use crate::store::{SheetStore, StoreError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Vision call failed: {0}")]
    Vision(#[from] VisionError),

    #[error("Saving to the sheet failed: {0}")]
    Store(#[from] StoreError),
}

/// An extracted record awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftRecord {
    id: Uuid,
    created_at: DateTime<Utc>,
    model: String,
    record: LabRecord,
    raw_reply: String,
}

impl DraftRecord {
    pub fn new(model: &str, record: LabRecord, raw_reply: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            model: model.to_string(),
            record,
            raw_reply,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn record(&self) -> &LabRecord {
        &self.record
    }

    /// The reply text exactly as the model returned it.
    pub fn raw_reply(&self) -> &str {
        &self.raw_reply
    }

    pub fn indices(&self) -> DerivedIndices {
        compute_indices(&self.record.values)
    }

    /// Copy with one value corrected.
    pub fn with_value(&self, field: LabField, value: Option<f64>) -> Self {
        let mut next = self.clone();
        next.record.values.set(field, value);
        next
    }

    /// Copy with the identifier replaced.
    pub fn with_identifier(&self, identifier: Option<String>) -> Self {
        let mut next = self.clone();
        next.record.identifier = identifier
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        next
    }

    /// Copy with the patient age replaced.
    pub fn with_age(&self, age: Option<PatientAge>) -> Self {
        let mut next = self.clone();
        next.record.age = age;
        next
    }
}

pub struct Ingestor {
    vision: Arc<dyn VisionClient>,
    store: Box<dyn SheetStore>,
    schema: SchemaVersion,
}

impl Ingestor {
    pub fn new(
        vision: Arc<dyn VisionClient>,
        store: Box<dyn SheetStore>,
        schema: SchemaVersion,
    ) -> Self {
        Self {
            vision,
            store,
            schema,
        }
    }

    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }

    pub fn store(&self) -> &dyn SheetStore {
        self.store.as_ref()
    }

    /// Read the submitted images into a draft. No network call is made when
    /// no image was supplied.
    pub fn extract(
        &self,
        images: &ReportImages,
        age: Option<PatientAge>,
    ) -> Result<DraftRecord, IngestError> {
        let _span = tracing::info_span!(
            "extract",
            images = images.len(),
            model = self.vision.model_name()
        )
        .entered();

        if images.is_empty() {
            return Err(ExtractionError::NoInput.into());
        }

        let request = ExtractionRequest::build(images)?;
        let raw = self.vision.extract(&request)?;
        let parsed = match parse_extraction_reply(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Model reply could not be parsed");
                return Err(e.into());
            }
        };

        let record = LabRecord {
            identifier: parsed.identifier,
            age,
            values: parsed.values,
        };
        tracing::info!(
            present = record.values.present_count(),
            of = LabField::ALL.len(),
            "Draft ready"
        );

        Ok(DraftRecord::new(self.vision.model_name(), record, raw))
    }

    /// Check the sheet header and append the draft as exactly one row.
    pub fn confirm_and_save(&self, draft: &DraftRecord) -> Result<(), IngestError> {
        let _span = tracing::info_span!("confirm_and_save", draft = %draft.id).entered();

        if draft.record.age.is_some() && !self.schema.has_age() {
            tracing::debug!(schema = %self.schema, "Schema has no age columns, age not written");
        }

        self.store.ensure_header(self.schema)?;
        let row = self.schema.to_row(&draft.record);
        self.store.append_row(&row)?;

        tracing::info!(sheet = self.store.name(), "Record saved");
        Ok(())
    }

    /// Extract and save without review.
    pub fn ingest(
        &self,
        images: &ReportImages,
        age: Option<PatientAge>,
    ) -> Result<DraftRecord, IngestError> {
        let draft = self.extract(images, age)?;
        self.confirm_and_save(&draft)?;
        Ok(draft)
    }
}
