//! Local single-file sheet store.
//!
//! Each sheet is a named, ordered list of rows; cells are kept as a JSON
//! array per row exactly as they would be sent to the remote sheet.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{row_text, SheetStore, StoreError};
use crate::models::Cell;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_sheets.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| StoreError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

pub struct SqliteSheetStore {
    conn: Connection,
    sheet_id: i64,
    name: String,
}

impl SqliteSheetStore {
    /// Create an empty sheet. Fails if a sheet with that name exists.
    pub fn create(conn: Connection, name: &str) -> Result<Self, StoreError> {
        if find_sheet(&conn, name)?.is_some() {
            return Err(StoreError::SheetExists(name.to_string()));
        }
        conn.execute(
            "INSERT INTO sheets (name, created_at) VALUES (?1, ?2)",
            params![name, chrono::Utc::now().to_rfc3339()],
        )?;
        let sheet_id = conn.last_insert_rowid();
        tracing::info!(sheet = name, "Created sheet");

        Ok(Self {
            conn,
            sheet_id,
            name: name.to_string(),
        })
    }

    /// Open an existing sheet by name.
    pub fn open(conn: Connection, name: &str) -> Result<Self, StoreError> {
        let sheet_id =
            find_sheet(&conn, name)?.ok_or_else(|| StoreError::SheetNotFound(name.to_string()))?;
        Ok(Self {
            conn,
            sheet_id,
            name: name.to_string(),
        })
    }

    /// Fresh in-memory store holding one empty sheet.
    pub fn in_memory(name: &str) -> Result<Self, StoreError> {
        Self::create(open_memory_database()?, name)
    }

    /// Number of rows including the header row.
    pub fn row_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sheet_rows WHERE sheet_id = ?1",
            params![self.sheet_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT cells FROM sheet_rows WHERE sheet_id = ?1 ORDER BY id")?;
        let raw = stmt
            .query_map(params![self.sheet_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|json| {
                let values: Vec<Value> = serde_json::from_str(json)?;
                Ok(row_text(&values))
            })
            .collect()
    }
}

fn find_sheet(conn: &Connection, name: &str) -> Result<Option<i64>, StoreError> {
    let id = conn
        .query_row(
            "SELECT id FROM sheets WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

impl SheetStore for SqliteSheetStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn header(&self) -> Result<Vec<String>, StoreError> {
        let first: Option<String> = self
            .conn
            .query_row(
                "SELECT cells FROM sheet_rows WHERE sheet_id = ?1 ORDER BY id LIMIT 1",
                params![self.sheet_id],
                |row| row.get(0),
            )
            .optional()?;

        match first {
            Some(json) => {
                let values: Vec<Value> = serde_json::from_str(&json)?;
                Ok(row_text(&values))
            }
            None => Ok(Vec::new()),
        }
    }

    fn append_row(&self, cells: &[Cell]) -> Result<(), StoreError> {
        let json = serde_json::to_string(cells)?;
        self.conn.execute(
            "INSERT INTO sheet_rows (sheet_id, cells, appended_at) VALUES (?1, ?2, ?3)",
            params![self.sheet_id, json, chrono::Utc::now().to_rfc3339()],
        )?;
        tracing::debug!(sheet = %self.name, cells = cells.len(), "Appended row");
        Ok(())
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        Ok(self.all_rows()?.into_iter().skip(1).collect())
    }
}
