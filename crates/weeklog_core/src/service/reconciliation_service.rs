//! Export/import reconciliation between activities and week annotations.
//!
//! # Responsibility
//! - `pack`: flatten every activity plus its week's per-day annotations into
//!   one self-contained export record.
//! - `unpack`: split flat records back into activity payloads and
//!   annotation writes, then rebuild the activity list.
//!
//! # Invariants
//! - `pack` performs no writes.
//! - `unpack` validates the whole document before the destructive clear; an
//!   input that is not a JSON array of objects never mutates either store.
//! - After the clear, per-record and per-annotation failures are skipped and
//!   reported, never raised.
//! - Reserved `<kind>-<day>` names are always annotation channels, never
//!   activity fields.
//!
//! # Consistency window
//! The clear and the rebuild are not one transaction. A process that stops
//! between them leaves a partially rebuilt list and partially written
//! annotations. Re-running the same import repairs both.

use crate::model::activity::{Activity, ActivityDraft, ActivityId};
use crate::model::annotation::{
    is_blank_json, AnnotationKey, AnnotationKind, AnnotationValue, ReservedField,
};
use crate::repo::activity_repo::{ActivityList, RepoError};
use crate::repo::annotation_store::AnnotationStore;
use log::{info, warn};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Suggested file name for the export artifact.
pub const EXPORT_FILE_NAME: &str = "activities.txt";
/// Largest import document accepted, in bytes.
pub const MAX_IMPORT_BYTES: usize = 16 * 1024 * 1024;

const IMPORT_SUCCESS_MESSAGE: &str = "Data imported successfully!";
const INVALID_STRUCTURE_MESSAGE: &str =
    "Invalid data format. Please ensure the file contains an array of activities.";
const INVALID_JSON_MESSAGE: &str = "Error parsing file. Please ensure it is a valid text file.";

/// One flattened activity: its own fields plus present annotation fields.
pub type ExportRecord = Map<String, Value>;

/// Operation-level failures of export/import.
#[derive(Debug)]
pub enum TransferError {
    /// Import text is not parseable JSON.
    InvalidJson(String),
    /// Import JSON is not an array of objects.
    InvalidStructure(String),
    /// Import text exceeds `MAX_IMPORT_BYTES`.
    InputTooLarge { size: usize, limit: usize },
    /// Export document could not be rendered.
    Encode(String),
    /// Activity list failure while reading or clearing.
    Activity(RepoError),
}

impl TransferError {
    /// Returns whether this is one of the two `InvalidFormat` aborts.
    pub fn is_invalid_format(&self) -> bool {
        matches!(self, Self::InvalidJson(_) | Self::InvalidStructure(_))
    }

    /// Notification text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidJson(_) => INVALID_JSON_MESSAGE.to_string(),
            Self::InvalidStructure(_) => INVALID_STRUCTURE_MESSAGE.to_string(),
            Self::InputTooLarge { limit, .. } => {
                format!("File is too large to import. The limit is {limit} bytes.")
            }
            Self::Encode(_) | Self::Activity(_) => format!("Operation failed: {self}"),
        }
    }

    /// Stable machine-readable kind, e.g. for FFI envelopes and log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::InvalidStructure(_) => "invalid_structure",
            Self::InputTooLarge { .. } => "input_too_large",
            Self::Encode(_) => "encode_failed",
            Self::Activity(_) => "activity_store_failed",
        }
    }
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(details) => write!(f, "import is not valid JSON: {details}"),
            Self::InvalidStructure(details) => {
                write!(f, "import is not an array of activity objects: {details}")
            }
            Self::InputTooLarge { size, limit } => {
                write!(f, "import has {size} bytes, limit is {limit}")
            }
            Self::Encode(details) => write!(f, "export encoding failed: {details}"),
            Self::Activity(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Activity(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TransferError {
    fn from(value: RepoError) -> Self {
        Self::Activity(value)
    }
}

/// Import element that did not become an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Zero-based position in the imported array.
    pub index: usize,
    pub reason: String,
}

/// Annotation field that was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAnnotation {
    /// Zero-based position of the owning element in the imported array.
    pub index: usize,
    /// Reserved field name, e.g. `freeWriting-3`.
    pub field: String,
    pub reason: String,
}

/// Outcome of a completed import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Identifiers of the created activities, in input order.
    pub imported: Vec<ActivityId>,
    /// Number of activities removed by the clear step.
    pub cleared: usize,
    /// Distinct annotation slots written. Activities sharing a week count
    /// a slot once.
    pub annotations_written: usize,
    pub skipped_records: Vec<SkippedRecord>,
    pub skipped_annotations: Vec<SkippedAnnotation>,
}

impl ImportReport {
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }

    /// Success notification text for the user.
    pub fn summary(&self) -> String {
        let mut message = format!(
            "{IMPORT_SUCCESS_MESSAGE} Imported {} activities.",
            self.imported_count()
        );
        if !self.skipped_records.is_empty() {
            message.push_str(&format!(
                " Skipped {} invalid entries.",
                self.skipped_records.len()
            ));
        }
        message
    }
}

/// Export result with the records and per-field read failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportOutcome {
    pub records: Vec<ExportRecord>,
    /// `(activity id, field name)` pairs omitted because their stored value
    /// could not be read.
    pub omitted_fields: Vec<(ActivityId, String)>,
}

/// Record split into activity payload and annotation writes.
struct RecordPlan {
    index: usize,
    draft: Result<ActivityDraft, String>,
    annotations: Vec<(ReservedField, AnnotationValue)>,
    rejected: Vec<SkippedAnnotation>,
}

/// Pack/unpack engine over an activity list and an annotation store.
pub struct ReconciliationEngine<L: ActivityList, S: AnnotationStore> {
    activities: L,
    annotations: S,
}

impl<L: ActivityList, S: AnnotationStore> ReconciliationEngine<L, S> {
    pub fn new(activities: L, annotations: S) -> Self {
        Self {
            activities,
            annotations,
        }
    }

    pub fn activities(&self) -> &L {
        &self.activities
    }

    pub fn annotations(&self) -> &S {
        &self.annotations
    }

    pub fn into_parts(self) -> (L, S) {
        (self.activities, self.annotations)
    }

    /// Builds one export record per activity, in list order.
    ///
    /// Unreadable annotation slots are omitted and logged.
    pub fn pack(&self) -> Result<Vec<ExportRecord>, TransferError> {
        Ok(self.pack_detailed()?.records)
    }

    /// Same as `pack`, also returning which fields were omitted.
    pub fn pack_detailed(&self) -> Result<ExportOutcome, TransferError> {
        let started_at = Instant::now();
        let activities = self.activities.list()?;
        let mut outcome = ExportOutcome {
            records: Vec::with_capacity(activities.len()),
            omitted_fields: Vec::new(),
        };
        let mut annotation_count = 0usize;

        for activity in &activities {
            let mut record = activity.to_object();
            for (key, result) in self.annotations.read_week(activity.week_key()) {
                let field = key.field().name();
                match result {
                    Ok(value) if value.is_empty_text() => {}
                    Ok(value) => {
                        record.insert(field, value.into_json());
                        annotation_count += 1;
                    }
                    Err(err) => {
                        warn!(
                            "event=export_field module=reconciliation status=skipped activity_id={} field={} error={}",
                            activity.id, field, err
                        );
                        outcome.omitted_fields.push((activity.id, field));
                    }
                }
            }
            outcome.records.push(record);
        }

        info!(
            "event=export module=reconciliation status=ok activities={} annotations={} omitted={} duration_ms={}",
            outcome.records.len(),
            annotation_count,
            outcome.omitted_fields.len(),
            started_at.elapsed().as_millis()
        );
        Ok(outcome)
    }

    /// Renders the export artifact: a pretty-printed JSON array.
    pub fn export_document(&self) -> Result<String, TransferError> {
        let records = self.pack()?;
        let document = Value::Array(records.into_iter().map(Value::Object).collect());
        serde_json::to_string_pretty(&document).map_err(|err| TransferError::Encode(err.to_string()))
    }

    /// Replaces the activity list with the records of `raw`.
    ///
    /// # Errors
    /// - `InputTooLarge`, `InvalidJson`, `InvalidStructure`: nothing was
    ///   mutated.
    /// - `Activity`: listing or removing existing activities failed; the
    ///   list may be partially cleared and nothing was created.
    pub fn unpack(&self, raw: &str) -> Result<ImportReport, TransferError> {
        let started_at = Instant::now();
        let plans = match parse_document(raw) {
            Ok(plans) => plans,
            Err(err) => {
                warn!(
                    "event=import module=reconciliation status=rejected error_code={} bytes={} error={}",
                    err.code(),
                    raw.len(),
                    err
                );
                return Err(err);
            }
        };

        let mut report = ImportReport {
            cleared: self.clear_activities()?,
            ..ImportReport::default()
        };

        let mut written = BTreeSet::new();
        for plan in plans {
            self.apply_plan(plan, &mut report, &mut written);
        }
        report.annotations_written = written.len();

        info!(
            "event=import module=reconciliation status=ok cleared={} imported={} annotations={} skipped_records={} skipped_annotations={} duration_ms={}",
            report.cleared,
            report.imported_count(),
            report.annotations_written,
            report.skipped_records.len(),
            report.skipped_annotations.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn clear_activities(&self) -> Result<usize, TransferError> {
        let existing = self.activities.list()?;
        for activity in &existing {
            self.activities.remove(activity.id)?;
        }
        Ok(existing.len())
    }

    fn apply_plan(
        &self,
        plan: RecordPlan,
        report: &mut ImportReport,
        written: &mut BTreeSet<AnnotationKey>,
    ) {
        let RecordPlan {
            index,
            draft,
            annotations,
            rejected,
        } = plan;

        for skipped in rejected {
            warn!(
                "event=import_field module=reconciliation status=skipped index={} field={} error={}",
                skipped.index, skipped.field, skipped.reason
            );
            report.skipped_annotations.push(skipped);
        }

        let created: Result<Activity, String> = draft.and_then(|draft| {
            self.activities
                .create(draft)
                .map_err(|err| err.to_string())
        });
        let activity = match created {
            Ok(activity) => activity,
            Err(reason) => {
                warn!(
                    "event=import_record module=reconciliation status=skipped index={} dropped_annotations={} error={}",
                    index,
                    annotations.len(),
                    reason
                );
                report.skipped_records.push(SkippedRecord { index, reason });
                return;
            }
        };

        let week = activity.week_key();
        let entries: Vec<_> = annotations
            .into_iter()
            .map(|(field, value)| (field.key_for(week), value))
            .collect();
        let failures = self.annotations.write_many(&entries);
        written.extend(
            entries
                .iter()
                .map(|(key, _)| *key)
                .filter(|key| failures.iter().all(|(failed, _)| failed != key)),
        );
        for (key, err) in failures {
            let field = key.field().name();
            warn!(
                "event=import_field module=reconciliation status=skipped index={} field={} error={}",
                index, field, err
            );
            report.skipped_annotations.push(SkippedAnnotation {
                index,
                field,
                reason: err.to_string(),
            });
        }

        report.imported.push(activity.id);
    }
}

/// Parses and splits the whole document without touching any store.
fn parse_document(raw: &str) -> Result<Vec<RecordPlan>, TransferError> {
    if raw.len() > MAX_IMPORT_BYTES {
        return Err(TransferError::InputTooLarge {
            size: raw.len(),
            limit: MAX_IMPORT_BYTES,
        });
    }

    let parsed: Value =
        serde_json::from_str(raw).map_err(|err| TransferError::InvalidJson(err.to_string()))?;
    let items = match parsed {
        Value::Array(items) => items,
        other => {
            return Err(TransferError::InvalidStructure(format!(
                "top-level value is {}, expected an array",
                json_type_name(&other)
            )));
        }
    };

    let mut objects = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(object) => objects.push(object),
            other => {
                return Err(TransferError::InvalidStructure(format!(
                    "element {index} is {}, expected an object",
                    json_type_name(&other)
                )));
            }
        }
    }

    Ok(objects
        .into_iter()
        .enumerate()
        .map(|(index, object)| split_record(index, object))
        .collect())
}

/// Splits reserved annotation fields off one record.
fn split_record(index: usize, object: Map<String, Value>) -> RecordPlan {
    let mut rest = Map::new();
    let mut annotations = Vec::new();
    let mut rejected = Vec::new();

    for (name, value) in object {
        let Some(field) = ReservedField::parse(&name) else {
            rest.insert(name, value);
            continue;
        };
        if is_blank_json(&value) {
            continue;
        }
        match incoming_annotation(field.kind, value) {
            Ok(annotation) => annotations.push((field, annotation)),
            Err(reason) => rejected.push(SkippedAnnotation {
                index,
                field: name,
                reason,
            }),
        }
    }

    RecordPlan {
        index,
        draft: ActivityDraft::from_object(rest).map_err(|err| err.to_string()),
        annotations,
        rejected,
    }
}

fn incoming_annotation(kind: AnnotationKind, value: Value) -> Result<AnnotationValue, String> {
    match (kind, value) {
        (AnnotationKind::PositiveNotes, value) => Ok(AnnotationValue::Structured(value)),
        (AnnotationKind::FreeWriting, Value::String(text)) => Ok(AnnotationValue::Text(text)),
        (AnnotationKind::FreeWriting, other) => Err(format!(
            "freeWriting expects text, got {}",
            json_type_name(&other)
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
