//! Core domain logic for weeklog, a personal weekly-activity tracker.
//! This crate owns activity/annotation persistence and export/import.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::activity::{Activity, ActivityDraft, ActivityId, ActivityValidationError, WeekKey};
pub use model::annotation::{
    reserved_field_names, AnnotationKey, AnnotationKind, AnnotationValue, DayIndex, ReservedField,
};
pub use repo::activity_repo::{ActivityList, RepoError, RepoResult, SqliteActivityRepository};
pub use repo::annotation_store::{
    AnnotationError, AnnotationResult, AnnotationStore, SqliteAnnotationStore,
};
pub use repo::memory::{MemoryActivityList, MemoryAnnotationStore};
pub use service::reconciliation_service::{
    ExportOutcome, ExportRecord, ImportReport, ReconciliationEngine, SkippedAnnotation,
    SkippedRecord, TransferError, EXPORT_FILE_NAME, MAX_IMPORT_BYTES,
};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
