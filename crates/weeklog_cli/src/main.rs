//! Command-line host for weeklog export/import.
//!
//! # Responsibility
//! - Stand in for the export button and the import file picker.
//! - Report distinct user-facing outcomes for success, format errors and
//!   structural errors.

use clap::{Parser, Subcommand};
use log::error;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use weeklog_core::db::open_db;
use weeklog_core::{
    default_log_level, init_logging, ActivityList, ReconciliationEngine, SqliteActivityRepository,
    SqliteAnnotationStore, TransferError, EXPORT_FILE_NAME,
};

const DEFAULT_DB_FILE_NAME: &str = "weeklog.sqlite3";

/// Top-level CLI parser for the `weeklog` binary.
#[derive(Debug, Parser)]
#[command(name = "weeklog", version, about = "Weekly activity tracker export/import")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database file
    #[arg(long, global = true, env = "WEEKLOG_DB_PATH", default_value = DEFAULT_DB_FILE_NAME)]
    db: PathBuf,

    /// Absolute directory for rolling log files (logging is off when unset)
    #[arg(long, global = true)]
    log_dir: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write all activities and their week annotations to one JSON file
    Export {
        /// Output file, `-` for stdout
        #[arg(long, short, default_value = EXPORT_FILE_NAME)]
        out: PathBuf,
    },
    /// Replace all activities with the contents of an exported file
    Import {
        /// File produced by `export`
        file: PathBuf,
    },
    /// Print the current activities as JSON lines
    List,
    /// Check core linkage
    Ping,
}

/// Failure carrying the message shown to the user.
#[derive(Debug)]
struct CliFailure {
    message: String,
}

impl From<String> for CliFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<TransferError> for CliFailure {
    fn from(err: TransferError) -> Self {
        error!("event=cli_command module=cli status=error error={err}");
        Self {
            message: err.user_message(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(failure) => {
            eprintln!("{}", failure.message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<String, CliFailure> {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    match &cli.command {
        Command::Ping => Ok(format!(
            "weeklog_core ping={} version={}",
            weeklog_core::ping(),
            weeklog_core::core_version()
        )),
        Command::Export { out } => export(&cli.db, out),
        Command::Import { file } => import(&cli.db, file),
        Command::List => list(&cli.db),
    }
}

fn export(db: &Path, out: &Path) -> Result<String, CliFailure> {
    let conn = open_db(db).map_err(|err| format!("failed to open `{}`: {err}", db.display()))?;
    let engine = ReconciliationEngine::new(
        SqliteActivityRepository::try_new(&conn).map_err(|err| err.to_string())?,
        SqliteAnnotationStore::try_new(&conn).map_err(|err| err.to_string())?,
    );
    let document = engine.export_document()?;

    if out == Path::new("-") {
        return Ok(document);
    }
    std::fs::write(out, document)
        .map_err(|err| format!("failed to write `{}`: {err}", out.display()))?;
    Ok(format!("Exported activities to {}", out.display()))
}

fn import(db: &Path, file: &Path) -> Result<String, CliFailure> {
    let raw = std::fs::read_to_string(file).map_err(|err| {
        if err.kind() == ErrorKind::InvalidData {
            return CliFailure::from(TransferError::InvalidJson(err.to_string()));
        }
        CliFailure::from(format!("failed to read `{}`: {err}", file.display()))
    })?;

    let conn = open_db(db).map_err(|err| format!("failed to open `{}`: {err}", db.display()))?;
    let engine = ReconciliationEngine::new(
        SqliteActivityRepository::try_new(&conn).map_err(|err| err.to_string())?,
        SqliteAnnotationStore::try_new(&conn).map_err(|err| err.to_string())?,
    );
    let report = engine.unpack(&raw)?;
    Ok(report.summary())
}

fn list(db: &Path) -> Result<String, CliFailure> {
    let conn = open_db(db).map_err(|err| format!("failed to open `{}`: {err}", db.display()))?;
    let repo = SqliteActivityRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let activities = repo.list().map_err(|err| err.to_string())?;

    let lines: Vec<String> = activities
        .iter()
        .map(|activity| Value::Object(activity.to_object()).to_string())
        .collect();
    Ok(lines.join("\n"))
}
