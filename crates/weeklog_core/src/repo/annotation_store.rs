//! Annotation store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist per-day week annotations keyed by `(kind, week, day)`.
//! - Encode structured values to text on write and decode them on read.
//!
//! # Invariants
//! - Writes overwrite unconditionally; last write wins.
//! - A stored structured value that no longer parses is reported as
//!   `AnnotationError::Malformed`, never replaced with a default.
//! - Removing an activity does not touch this store.

use crate::db::{ensure_table, DbError};
use crate::model::activity::WeekKey;
use crate::model::annotation::{AnnotationKey, AnnotationKind, AnnotationValue};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type AnnotationResult<T> = Result<T, AnnotationError>;

/// Failure reading or writing one annotation entry.
#[derive(Debug)]
pub enum AnnotationError {
    /// Stored or incoming value does not have the shape its kind requires.
    Malformed { key: AnnotationKey, reason: String },
    Db(DbError),
}

impl Display for AnnotationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { key, reason } => {
                write!(f, "malformed annotation `{key}`: {reason}")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AnnotationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed { .. } => None,
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for AnnotationError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for AnnotationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Key-value persistence for week annotations.
pub trait AnnotationStore {
    /// Reads one entry. Absence is `Ok(None)`.
    fn read(&self, key: &AnnotationKey) -> AnnotationResult<Option<AnnotationValue>>;

    /// Writes one entry, replacing any previous value.
    fn write(&self, key: &AnnotationKey, value: &AnnotationValue) -> AnnotationResult<()>;

    /// Reads all 14 slots of a week.
    ///
    /// Absent slots are omitted; per-slot failures are returned alongside
    /// successful reads so one bad entry never hides the others.
    fn read_week(&self, week: WeekKey) -> Vec<(AnnotationKey, AnnotationResult<AnnotationValue>)> {
        AnnotationKey::all_for_week(week)
            .filter_map(|key| match self.read(&key) {
                Ok(Some(value)) => Some((key, Ok(value))),
                Ok(None) => None,
                Err(err) => Some((key, Err(err))),
            })
            .collect()
    }

    /// Writes entries in order and returns the ones that failed.
    fn write_many(
        &self,
        entries: &[(AnnotationKey, AnnotationValue)],
    ) -> Vec<(AnnotationKey, AnnotationError)> {
        entries
            .iter()
            .filter_map(|(key, value)| self.write(key, value).err().map(|err| (*key, err)))
            .collect()
    }
}

impl<T: AnnotationStore + ?Sized> AnnotationStore for &T {
    fn read(&self, key: &AnnotationKey) -> AnnotationResult<Option<AnnotationValue>> {
        (**self).read(key)
    }

    fn write(&self, key: &AnnotationKey, value: &AnnotationValue) -> AnnotationResult<()> {
        (**self).write(key, value)
    }
}

/// Encodes a value to its stored text form.
///
/// Fails when the value shape does not match the key kind.
pub fn encode_annotation(key: &AnnotationKey, value: &AnnotationValue) -> AnnotationResult<String> {
    match (key.kind, value) {
        (AnnotationKind::PositiveNotes, AnnotationValue::Structured(json)) => {
            serde_json::to_string(json).map_err(|err| AnnotationError::Malformed {
                key: *key,
                reason: format!("value is not serializable: {err}"),
            })
        }
        (AnnotationKind::FreeWriting, AnnotationValue::Text(text)) => Ok(text.clone()),
        (kind, other) => Err(AnnotationError::Malformed {
            key: *key,
            reason: format!("{} value cannot be stored as {kind}", other.kind()),
        }),
    }
}

/// Decodes stored text back into the value shape of the key kind.
pub fn decode_annotation(key: &AnnotationKey, stored: &str) -> AnnotationResult<AnnotationValue> {
    match key.kind {
        AnnotationKind::PositiveNotes => serde_json::from_str(stored)
            .map(AnnotationValue::Structured)
            .map_err(|err| AnnotationError::Malformed {
                key: *key,
                reason: format!("stored text is not valid JSON: {err}"),
            }),
        AnnotationKind::FreeWriting => Ok(AnnotationValue::Text(stored.to_string())),
    }
}

/// SQLite-backed annotation store.
pub struct SqliteAnnotationStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAnnotationStore<'conn> {
    /// Constructs a store over a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> AnnotationResult<Self> {
        ensure_table(conn, "annotations")?;
        Ok(Self { conn })
    }
}

impl AnnotationStore for SqliteAnnotationStore<'_> {
    fn read(&self, key: &AnnotationKey) -> AnnotationResult<Option<AnnotationValue>> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value
                 FROM annotations
                 WHERE kind = ?1
                   AND week_number = ?2
                   AND year = ?3
                   AND day_index = ?4;",
                params![
                    key.kind.as_str(),
                    key.week.week_number,
                    key.week.year,
                    key.day.get(),
                ],
                |row| row.get(0),
            )
            .optional()?;

        stored
            .map(|text| decode_annotation(key, &text))
            .transpose()
    }

    fn write(&self, key: &AnnotationKey, value: &AnnotationValue) -> AnnotationResult<()> {
        let encoded = encode_annotation(key, value)?;
        self.conn.execute(
            "INSERT INTO annotations (kind, week_number, year, day_index, value)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (kind, week_number, year, day_index) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                key.kind.as_str(),
                key.week.week_number,
                key.week.year,
                key.day.get(),
                encoded,
            ],
        )?;
        Ok(())
    }
}
