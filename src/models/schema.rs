//! Versioned column layout of the shared sheet.
//!
//! A record is never written as a loose list: every column has a named
//! source in [`LabRecord`], and each [`SchemaVersion`] fixes the order.
//! The column tables are checked at compile time; the header row found in
//! the store is checked against the schema before every append.

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::enums::SchemaVersion;
use super::lab::{LabField, LabRecord, LabValues, PatientAge};
use crate::pipeline::normalize::normalize_numeric;

/// A single cell written to the store. Missing values are written as `Empty`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Empty => serializer.serialize_str(""),
            Cell::Text(text) => serializer.serialize_str(text),
            Cell::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Cell::Number(_) => serializer.serialize_str(""),
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Identifier,
    AgeYears,
    AgeMonths,
    AgeTotalMonths,
    Lab(LabField),
}

const SLOT_COUNT: usize = 4 + LabField::ALL.len();

impl Column {
    const fn slot(self) -> usize {
        match self {
            Column::Identifier => 0,
            Column::AgeYears => 1,
            Column::AgeMonths => 2,
            Column::AgeTotalMonths => 3,
            Column::Lab(field) => 4 + field.index(),
        }
    }

    pub const fn header(self) -> &'static str {
        match self {
            Column::Identifier => "ID",
            Column::AgeYears => "YEARS",
            Column::AgeMonths => "MONTHS",
            Column::AgeTotalMonths => "TOTAL_MONTHS",
            Column::Lab(field) => field.key(),
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim();
        [
            Column::Identifier,
            Column::AgeYears,
            Column::AgeMonths,
            Column::AgeTotalMonths,
        ]
        .into_iter()
        .find(|c| c.header().eq_ignore_ascii_case(header))
        .or_else(|| LabField::from_key(header).map(Column::Lab))
    }

    fn cell(self, record: &LabRecord) -> Cell {
        match self {
            Column::Identifier => record
                .identifier
                .as_ref()
                .map_or(Cell::Empty, |id| Cell::Text(id.clone())),
            Column::AgeYears => record.age.map(|a| a.years() as f64).into(),
            Column::AgeMonths => record.age.map(|a| a.months() as f64).into(),
            Column::AgeTotalMonths => record.age.map(|a| a.total_months() as f64).into(),
            Column::Lab(field) => record.values.get(field).into(),
        }
    }
}

const V1_COLUMNS: [Column; 9] = [
    Column::Identifier,
    Column::Lab(LabField::Hgb),
    Column::Lab(LabField::Plt),
    Column::Lab(LabField::Rdw),
    Column::Lab(LabField::Neut),
    Column::Lab(LabField::Lymph),
    Column::Lab(LabField::Ig),
    Column::Lab(LabField::Crp),
    Column::Lab(LabField::Pct),
];

const V2_COLUMNS: [Column; 12] = [
    Column::Identifier,
    Column::AgeYears,
    Column::AgeMonths,
    Column::AgeTotalMonths,
    Column::Lab(LabField::Hgb),
    Column::Lab(LabField::Plt),
    Column::Lab(LabField::Rdw),
    Column::Lab(LabField::Neut),
    Column::Lab(LabField::Lymph),
    Column::Lab(LabField::Ig),
    Column::Lab(LabField::Crp),
    Column::Lab(LabField::Pct),
];

const fn columns_are_unique(columns: &[Column]) -> bool {
    let mut seen = [false; SLOT_COUNT];
    let mut i = 0;
    while i < columns.len() {
        let slot = columns[i].slot();
        if seen[slot] {
            return false;
        }
        seen[slot] = true;
        i += 1;
    }
    true
}

const fn lab_column_count(columns: &[Column]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < columns.len() {
        if let Column::Lab(_) = columns[i] {
            count += 1;
        }
        i += 1;
    }
    count
}

const _: () = assert!(columns_are_unique(&V1_COLUMNS));
const _: () = assert!(columns_are_unique(&V2_COLUMNS));
const _: () = assert!(lab_column_count(&V1_COLUMNS) == LabField::ALL.len());
const _: () = assert!(lab_column_count(&V2_COLUMNS) == LabField::ALL.len());
const _: () = assert!(V2_COLUMNS.len() == V1_COLUMNS.len() + 3);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Sheet has no header row (expected {expected:?})")]
    MissingHeader { expected: Vec<String> },

    #[error("Sheet header does not match schema {version}: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        version: SchemaVersion,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl SchemaVersion {
    pub fn columns(self) -> &'static [Column] {
        match self {
            SchemaVersion::V1 => &V1_COLUMNS,
            SchemaVersion::V2 => &V2_COLUMNS,
        }
    }

    pub fn header(self) -> Vec<String> {
        self.columns().iter().map(|c| c.header().to_string()).collect()
    }

    pub fn has_age(self) -> bool {
        self.columns().contains(&Column::AgeTotalMonths)
    }

    /// Cells in this schema's column order.
    pub fn to_row(self, record: &LabRecord) -> Vec<Cell> {
        self.columns().iter().map(|c| c.cell(record)).collect()
    }

    /// Verify the store's header row. Trailing blank header cells are ignored.
    pub fn check_header(self, found: &[String]) -> Result<(), SchemaError> {
        let expected = self.header();
        let trimmed: Vec<String> = found.iter().map(|h| h.trim().to_string()).collect();
        let used = trimmed
            .iter()
            .rposition(|h| !h.is_empty())
            .map_or(0, |last| last + 1);

        if used == 0 {
            return Err(SchemaError::MissingHeader { expected });
        }
        if trimmed[..used] != expected[..] {
            return Err(SchemaError::HeaderMismatch {
                version: self,
                expected,
                found: trimmed[..used].to_vec(),
            });
        }
        Ok(())
    }
}

/// Rebuild a record from one sheet row, mapping cells by header name.
///
/// Unknown headers are ignored and short rows read as missing cells. Every
/// numeric cell goes through [`normalize_numeric`].
pub fn record_from_row(header: &[String], cells: &[String]) -> LabRecord {
    let mut identifier = None;
    let mut years = None;
    let mut months = None;
    let mut total_months = None;
    let mut values = LabValues::default();

    for (i, name) in header.iter().enumerate() {
        let Some(column) = Column::from_header(name) else {
            continue;
        };
        let raw = cells.get(i).map(String::as_str).unwrap_or("").trim();
        match column {
            Column::Identifier => {
                if !raw.is_empty() {
                    identifier = Some(raw.to_string());
                }
            }
            Column::AgeYears => years = whole_number(raw),
            Column::AgeMonths => months = whole_number(raw),
            Column::AgeTotalMonths => total_months = whole_number(raw),
            Column::Lab(field) => values.set(field, normalize_numeric(raw)),
        }
    }

    let age = match (years, months, total_months) {
        (Some(y), Some(m), _) => PatientAge::new(y, m).ok(),
        (_, _, Some(t)) => PatientAge::new(t / 12, t % 12).ok(),
        _ => None,
    };

    LabRecord {
        identifier,
        age,
        values,
    }
}

fn whole_number(raw: &str) -> Option<u32> {
    let value = normalize_numeric(raw)?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sample_record() -> LabRecord {
        LabRecord {
            identifier: Some("Protokol 1042".into()),
            age: Some(PatientAge::new(1, 3).unwrap()),
            values: LabValues::default()
                .with(LabField::Hgb, Some(10.2))
                .with(LabField::Plt, Some(250000.0))
                .with(LabField::Neut, Some(4.0))
                .with(LabField::Lymph, Some(2.0)),
        }
    }

    #[test]
    fn headers_per_version() {
        assert_eq!(
            SchemaVersion::V1.header(),
            strings(&["ID", "HGB", "PLT", "RDW", "NEUT", "LYMPH", "IG", "CRP", "PCT"])
        );
        assert_eq!(
            SchemaVersion::V2.header(),
            strings(&[
                "ID", "YEARS", "MONTHS", "TOTAL_MONTHS", "HGB", "PLT", "RDW", "NEUT", "LYMPH",
                "IG", "CRP", "PCT"
            ])
        );
        assert!(SchemaVersion::V2.has_age());
        assert!(!SchemaVersion::V1.has_age());
    }

    #[test]
    fn to_row_follows_column_order() {
        let row = SchemaVersion::V2.to_row(&sample_record());
        assert_eq!(row.len(), 12);
        assert_eq!(row[0], Cell::Text("Protokol 1042".into()));
        assert_eq!(row[1], Cell::Number(1.0));
        assert_eq!(row[2], Cell::Number(3.0));
        assert_eq!(row[3], Cell::Number(15.0));
        assert_eq!(row[4], Cell::Number(10.2));
        assert_eq!(row[6], Cell::Empty); // RDW
        assert_eq!(row[7], Cell::Number(4.0));
    }

    #[test]
    fn missing_values_serialize_as_empty_string() {
        let row = SchemaVersion::V1.to_row(&LabRecord::default());
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"["","","","","","","","",""]"#);
    }

    #[test]
    fn v1_row_omits_age() {
        let row = SchemaVersion::V1.to_row(&sample_record());
        assert_eq!(row.len(), 9);
        assert_eq!(row[1], Cell::Number(10.2));
    }

    #[test]
    fn check_header_accepts_exact_and_trailing_blanks() {
        let mut header = SchemaVersion::V1.header();
        assert!(SchemaVersion::V1.check_header(&header).is_ok());
        header.push(String::new());
        header.push("  ".into());
        assert!(SchemaVersion::V1.check_header(&header).is_ok());
    }

    #[test]
    fn check_header_rejects_swapped_columns() {
        let found = strings(&["ID", "PLT", "HGB", "RDW", "NEUT", "LYMPH", "IG", "CRP", "PCT"]);
        let err = SchemaVersion::V1.check_header(&found).unwrap_err();
        assert!(matches!(err, SchemaError::HeaderMismatch { .. }));
    }

    #[test]
    fn check_header_rejects_other_version() {
        let err = SchemaVersion::V2
            .check_header(&SchemaVersion::V1.header())
            .unwrap_err();
        assert!(matches!(err, SchemaError::HeaderMismatch { version: SchemaVersion::V2, .. }));
    }

    #[test]
    fn check_header_rejects_empty_sheet() {
        let err = SchemaVersion::V2.check_header(&[]).unwrap_err();
        assert!(matches!(err, SchemaError::MissingHeader { .. }));
    }

    #[test]
    fn record_from_row_maps_by_name() {
        let header = strings(&["LYMPH", "ID", "NEUT", "Notes"]);
        let cells = strings(&["2,0", "A-7", "4", "anything"]);
        let record = record_from_row(&header, &cells);
        assert_eq!(record.identifier.as_deref(), Some("A-7"));
        assert_eq!(record.values.get(LabField::Lymph), Some(2.0));
        assert_eq!(record.values.get(LabField::Neut), Some(4.0));
        assert_eq!(record.values.get(LabField::Hgb), None);
    }

    #[test]
    fn record_from_row_reads_legacy_header_aliases() {
        let header = strings(&["ID", "NEUT_HASH", "LYMPH_HASH", "Prokalsitonin"]);
        let cells = strings(&["B", "3.1", "1.2", "0.08"]);
        let record = record_from_row(&header, &cells);
        assert_eq!(record.values.get(LabField::Neut), Some(3.1));
        assert_eq!(record.values.get(LabField::Lymph), Some(1.2));
        assert_eq!(record.values.get(LabField::Pct), Some(0.08));
    }

    #[test]
    fn record_from_short_row_is_missing_not_zero() {
        let header = SchemaVersion::V1.header();
        let record = record_from_row(&header, &strings(&["C", "9.8"]));
        assert_eq!(record.values.get(LabField::Hgb), Some(9.8));
        assert_eq!(record.values.get(LabField::Crp), None);
    }

    #[test]
    fn record_from_row_age_from_parts_or_total() {
        let header = SchemaVersion::V2.header();
        let record = record_from_row(&header, &strings(&["D", "2", "4", "28"]));
        assert_eq!(record.age, Some(PatientAge::new(2, 4).unwrap()));

        let record = record_from_row(&header, &strings(&["E", "", "", "30"]));
        assert_eq!(record.age, Some(PatientAge::new(2, 6).unwrap()));

        let record = record_from_row(&header, &strings(&["F", "1.5", "", ""]));
        assert_eq!(record.age, None);
    }

    #[test]
    fn record_from_row_implausible_age_is_missing() {
        let header = SchemaVersion::V2.header();
        let record = record_from_row(&header, &strings(&["typo", "400000000", "0", ""]));
        assert_eq!(record.identifier.as_deref(), Some("typo"));
        assert_eq!(record.age, None);

        let record = record_from_row(&header, &strings(&["typo", "", "", "4294967295"]));
        assert_eq!(record.age, None);
    }

    #[test]
    fn row_round_trips_through_text() {
        let record = sample_record();
        let header = SchemaVersion::V2.header();
        let cells: Vec<String> = SchemaVersion::V2
            .to_row(&record)
            .into_iter()
            .map(|c| match c {
                Cell::Empty => String::new(),
                Cell::Text(t) => t,
                Cell::Number(n) => n.to_string(),
            })
            .collect();
        assert_eq!(record_from_row(&header, &cells), record);
    }
}
