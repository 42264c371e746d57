use std::process::ExitCode;

use clap::{Parser, Subcommand};

use labtrack_lib::commands::analyze::AnalyzeArgs;
use labtrack_lib::commands::ingest::IngestArgs;
use labtrack_lib::commands::sheet::SheetCommand;
use labtrack_lib::commands::{self, CommandError};
use labtrack_lib::config;

/// Read pediatric lab report photos into a shared sheet and summarize them.
#[derive(Parser, Debug)]
#[command(name = "labtrack", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract values from report photos, review them and append one row
    Ingest(IngestArgs),
    /// Summarize every stored row, with derived indices recomputed
    Analyze(AnalyzeArgs),
    /// Manage the shared sheet
    #[command(subcommand)]
    Sheet(SheetCommand),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let dotenv = config::load_dotenv();
    labtrack_lib::init_tracing();
    match dotenv {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env"),
    }
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let result: Result<(), CommandError> = match cli.command {
        Command::Ingest(args) => commands::ingest::run(args),
        Command::Analyze(args) => commands::analyze::run(args),
        Command::Sheet(command) => commands::sheet::run(command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(raw) = e.raw_reply() {
                eprintln!("--- model reply ---\n{raw}\n-------------------");
            }
            ExitCode::FAILURE
        }
    }
}
