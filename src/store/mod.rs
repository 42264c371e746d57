//! The shared sheet: the only persistent state of the system.
//!
//! A store is addressed by name and exposes its first sheet as an ordered,
//! append-only list of rows whose first row is the header.

pub mod google;
pub mod sqlite;

pub use google::{GoogleSheetStore, ServiceAccountKey};
pub use sqlite::SqliteSheetStore;

use serde_json::Value;
use thiserror::Error;

use crate::models::{Cell, SchemaError, SchemaVersion};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Sheets API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Sheet already exists: {0}")]
    SheetExists(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Spreadsheet-like store (allows swapping the remote sheet for SQLite).
pub trait SheetStore {
    /// Name the store was opened by.
    fn name(&self) -> &str;

    /// The header row, or an empty list when the sheet has no rows.
    fn header(&self) -> Result<Vec<String>, StoreError>;

    /// Append exactly one row after the last one.
    fn append_row(&self, cells: &[Cell]) -> Result<(), StoreError>;

    /// Every data row (header excluded), as cell text, in append order.
    fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError>;

    /// Write the schema header into an empty sheet, or check the existing
    /// one against the schema.
    fn ensure_header(&self, schema: SchemaVersion) -> Result<(), StoreError> {
        let found = self.header()?;
        if found.iter().all(|h| h.trim().is_empty()) {
            tracing::info!(sheet = self.name(), schema = %schema, "Writing header row");
            let cells: Vec<Cell> = schema.header().into_iter().map(Cell::Text).collect();
            return self.append_row(&cells);
        }
        schema.check_header(&found)?;
        Ok(())
    }
}

/// Text of a cell value as returned by a store read.
pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn row_text(values: &[Value]) -> Vec<String> {
    values.iter().map(cell_text).collect()
}

/// True when every cell of a row is blank.
pub fn is_blank_row(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}
