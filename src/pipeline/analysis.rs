//! Analysis: read every stored row back, recompute the derived indices and
//! summarize each metric, overall and per pediatric age band.

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::indices::{compute_indices, DerivedIndices};
use crate::models::{record_from_row, LabField, LabRecord, SchemaVersion};
use crate::store::{is_blank_row, SheetStore, StoreError};

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Reading the sheet failed: {0}")]
    Store(#[from] StoreError),
}

/// A stored row with its indices recomputed from the raw values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedRecord {
    /// 1-based sheet row, header included, as shown in the spreadsheet.
    pub row: usize,
    pub record: LabRecord,
    pub indices: DerivedIndices,
}

/// Read all data rows and rebuild records by header name.
///
/// Blank rows are skipped. A header that differs from the configured schema
/// is logged but still read by name.
pub fn load_records(
    store: &dyn SheetStore,
    schema: SchemaVersion,
) -> Result<Vec<AnalyzedRecord>, AnalysisError> {
    let _span = tracing::info_span!("load_records", sheet = store.name()).entered();

    let header = store.header()?;
    if header.is_empty() {
        tracing::info!("Sheet is empty");
        return Ok(Vec::new());
    }
    if let Err(e) = schema.check_header(&header) {
        tracing::warn!(error = %e, "Reading rows by header name despite schema mismatch");
    }

    let rows = store.read_rows()?;
    let total = rows.len();
    let records: Vec<AnalyzedRecord> = rows
        .iter()
        .enumerate()
        .filter(|(_, cells)| !is_blank_row(cells))
        .map(|(i, cells)| {
            let record = record_from_row(&header, cells);
            let indices = compute_indices(&record.values);
            AnalyzedRecord {
                row: i + 2,
                record,
                indices,
            }
        })
        .collect();

    tracing::info!(rows = total, records = records.len(), "Loaded records");
    Ok(records)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Lab(LabField),
    Nlr,
    Plr,
    Sii,
    AgeMonths,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::Lab(LabField::Hgb),
        Metric::Lab(LabField::Plt),
        Metric::Lab(LabField::Rdw),
        Metric::Lab(LabField::Neut),
        Metric::Lab(LabField::Lymph),
        Metric::Lab(LabField::Ig),
        Metric::Lab(LabField::Crp),
        Metric::Lab(LabField::Pct),
        Metric::Nlr,
        Metric::Plr,
        Metric::Sii,
        Metric::AgeMonths,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Lab(field) => field.key(),
            Metric::Nlr => "NLR",
            Metric::Plr => "PLR",
            Metric::Sii => "SII",
            Metric::AgeMonths => "AGE_MONTHS",
        }
    }

    pub fn value(self, record: &AnalyzedRecord) -> Option<f64> {
        match self {
            Metric::Lab(field) => record.record.values.get(field),
            Metric::Nlr => record.indices.nlr,
            Metric::Plr => record.indices.plr,
            Metric::Sii => record.indices.sii,
            Metric::AgeMonths => record.record.age.map(|a| a.total_months() as f64),
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub metric: Metric,
    /// Records with a value.
    pub n: usize,
    pub missing: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; needs two values.
    pub sd: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl MetricSummary {
    fn from_values(metric: Metric, mut values: Vec<f64>, missing: usize) -> Self {
        let n = values.len();
        if n == 0 {
            return Self {
                metric,
                n,
                missing,
                mean: None,
                sd: None,
                median: None,
                min: None,
                max: None,
            };
        }

        values.sort_by(f64::total_cmp);
        let mean = values.iter().sum::<f64>() / n as f64;
        let sd = (n >= 2).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        });
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };

        Self {
            metric,
            n,
            missing,
            mean: Some(mean),
            sd,
            median: Some(median),
            min: values.first().copied(),
            max: values.last().copied(),
        }
    }
}

/// Summary per metric, in [`Metric::ALL`] order.
pub fn summarize(records: &[AnalyzedRecord]) -> Vec<MetricSummary> {
    Metric::ALL
        .into_iter()
        .map(|metric| {
            let values: Vec<f64> = records.iter().filter_map(|r| metric.value(r)).collect();
            let missing = records.len() - values.len();
            MetricSummary::from_values(metric, values, missing)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgeBand {
    Infant,
    EarlyChildhood,
    SchoolAge,
    Adolescent,
    Unknown,
}

impl AgeBand {
    pub const ALL: [AgeBand; 5] = [
        AgeBand::Infant,
        AgeBand::EarlyChildhood,
        AgeBand::SchoolAge,
        AgeBand::Adolescent,
        AgeBand::Unknown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AgeBand::Infant => "<1y",
            AgeBand::EarlyChildhood => "1-5y",
            AgeBand::SchoolAge => "5-12y",
            AgeBand::Adolescent => "12y+",
            AgeBand::Unknown => "unknown",
        }
    }

    pub fn of(record: &LabRecord) -> Self {
        match record.age.map(|a| a.total_months()) {
            None => AgeBand::Unknown,
            Some(m) if m < 12 => AgeBand::Infant,
            Some(m) if m < 60 => AgeBand::EarlyChildhood,
            Some(m) if m < 144 => AgeBand::SchoolAge,
            Some(_) => AgeBand::Adolescent,
        }
    }
}

impl Serialize for AgeBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeBandSummary {
    pub band: AgeBand,
    pub records: usize,
    pub metrics: Vec<MetricSummary>,
}

/// Summaries per age band, youngest first; bands without records are omitted.
pub fn summarize_by_age_band(records: &[AnalyzedRecord]) -> Vec<AgeBandSummary> {
    AgeBand::ALL
        .into_iter()
        .filter_map(|band| {
            let members: Vec<AnalyzedRecord> = records
                .iter()
                .filter(|r| AgeBand::of(&r.record) == band)
                .cloned()
                .collect();
            if members.is_empty() {
                return None;
            }
            Some(AgeBandSummary {
                band,
                records: members.len(),
                metrics: summarize(&members),
            })
        })
        .collect()
}
