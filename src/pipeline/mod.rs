pub mod analysis;
pub mod extraction;
pub mod indices;
pub mod ingest;
pub mod normalize;

pub use analysis::{
    load_records, summarize, summarize_by_age_band, AgeBand, AgeBandSummary, AnalysisError,
    AnalyzedRecord, Metric, MetricSummary,
};
pub use indices::{compute_indices, DerivedIndices};
pub use ingest::{DraftRecord, IngestError, Ingestor};
pub use normalize::{normalize_json, normalize_numeric};
