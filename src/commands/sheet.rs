use std::fmt::Write as _;

use super::CommandError;
use crate::config::{env_lookup, StoreSettings};
use crate::models::SchemaVersion;
use crate::store::{SheetStore, StoreError};

#[derive(clap::Subcommand, Debug)]
pub enum SheetCommand {
    /// Create the sheet if needed (local store) and write the schema header
    Init,
    /// Print the header row and the number of data rows
    Show,
}

/// Header, schema check and row count of an open sheet.
pub fn describe(store: &dyn SheetStore, schema: SchemaVersion) -> Result<String, StoreError> {
    let header = store.header()?;
    let rows = store.read_rows()?;

    let mut out = String::new();
    let _ = writeln!(out, "Sheet: {}", store.name());
    if header.is_empty() {
        let _ = writeln!(out, "Header: (none)");
    } else {
        let _ = writeln!(out, "Header: {}", header.join(", "));
    }
    let status = match schema.check_header(&header) {
        Ok(()) => format!("matches schema {schema}"),
        Err(e) => e.to_string(),
    };
    let _ = writeln!(out, "Schema: {status}");
    let _ = writeln!(out, "Rows: {}", rows.len());
    Ok(out)
}

pub fn run(command: SheetCommand) -> Result<(), CommandError> {
    let settings = StoreSettings::from_lookup(&env_lookup)?;

    match command {
        SheetCommand::Init => {
            let store = settings.open_or_create()?;
            store.ensure_header(settings.schema)?;
            println!(
                "Sheet \"{}\" ready with schema {}.",
                store.name(),
                settings.schema
            );
        }
        SheetCommand::Show => {
            let store = settings.open()?;
            print!("{}", describe(store.as_ref(), settings.schema)?);
        }
    }
    Ok(())
}
