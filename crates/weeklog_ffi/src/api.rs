//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose export/import as use-case level functions to Dart via FRB.
//! - Translate core outcomes into plain response envelopes for the UI.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Import failures carry a stable `error_kind` so the UI can tell a
//!   syntax error from a structural error.

use log::warn;
use weeklog_core::db::open_db;
use weeklog_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    ImportReport, ReconciliationEngine, SqliteActivityRepository, SqliteAnnotationStore,
    EXPORT_FILE_NAME,
};

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Exposes core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Export response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResponse {
    pub ok: bool,
    /// Pretty-printed JSON array, present when `ok`.
    pub document: Option<String>,
    /// Suggested download file name.
    pub file_name: String,
    pub message: String,
}

/// Import response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResponse {
    pub ok: bool,
    /// `TransferError::code()` of the failure, or `storage` when the database
    /// could not be opened. `None` on success.
    pub error_kind: Option<String>,
    pub imported_count: u32,
    pub skipped_records: u32,
    pub skipped_annotations: u32,
    /// User-facing notification text.
    pub message: String,
}

impl ImportResponse {
    fn success(report: &ImportReport) -> Self {
        Self {
            ok: true,
            error_kind: None,
            imported_count: saturating_u32(report.imported_count()),
            skipped_records: saturating_u32(report.skipped_records.len()),
            skipped_annotations: saturating_u32(report.skipped_annotations.len()),
            message: report.summary(),
        }
    }

    fn failure(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_kind: Some(kind.to_string()),
            imported_count: 0,
            skipped_records: 0,
            skipped_annotations: 0,
            message: message.into(),
        }
    }
}

/// Builds the export document for the database at `db_path`.
///
/// # FFI contract
/// - Sync call, DB-backed execution, read-only.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn export_activities(db_path: String) -> ExportResponse {
    let result = with_engine(db_path.as_str(), |engine| {
        engine.export_document().map_err(|err| err.user_message())
    });
    match result {
        Ok(document) => ExportResponse {
            ok: true,
            document: Some(document),
            file_name: EXPORT_FILE_NAME.to_string(),
            message: "Export ready.".to_string(),
        },
        Err(message) => ExportResponse {
            ok: false,
            document: None,
            file_name: EXPORT_FILE_NAME.to_string(),
            message,
        },
    }
}

/// Replaces all activities with the contents of one selected file.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - `content` is the full text of the selected file.
/// - On `invalid_json`, `invalid_structure` and `input_too_large` nothing
///   was changed.
#[flutter_rust_bridge::frb(sync)]
pub fn import_activities(db_path: String, content: String) -> ImportResponse {
    let result = with_engine(db_path.as_str(), |engine| Ok(engine.unpack(content.as_str())));
    match result {
        Ok(Ok(report)) => ImportResponse::success(&report),
        Ok(Err(err)) => {
            warn!("event=ffi_import module=ffi status=error error={err}");
            ImportResponse::failure(err.code(), err.user_message())
        }
        Err(message) => ImportResponse::failure("storage", message),
    }
}

type SqliteEngine<'conn> =
    ReconciliationEngine<SqliteActivityRepository<'conn>, SqliteAnnotationStore<'conn>>;

fn with_engine<T>(
    db_path: &str,
    f: impl FnOnce(&SqliteEngine<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let conn = open_db(db_path.trim()).map_err(|err| format!("database open failed: {err}"))?;
    let activities = SqliteActivityRepository::try_new(&conn)
        .map_err(|err| format!("activity list init failed: {err}"))?;
    let annotations = SqliteAnnotationStore::try_new(&conn)
        .map_err(|err| format!("annotation store init failed: {err}"))?;
    f(&ReconciliationEngine::new(activities, annotations))
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
