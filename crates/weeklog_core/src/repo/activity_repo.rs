//! Activity list contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the `list/create/remove` surface consumed by import/export.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - `create` always assigns a fresh identifier.
//! - `list` returns active activities in insertion order.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::{ensure_table, DbError};
use crate::model::activity::{Activity, ActivityDraft, ActivityId, ActivityValidationError};
use log::debug;
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for activity persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Validation(ActivityValidationError),
    Db(DbError),
    NotFound(ActivityId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "activity not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted activity data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ActivityValidationError> for RepoError {
    fn from(value: ActivityValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Ordered collection of activities owned outside the reconciliation engine.
pub trait ActivityList {
    /// Returns every activity in list order.
    fn list(&self) -> RepoResult<Vec<Activity>>;
    /// Validates the draft and appends it under a fresh identifier.
    fn create(&self, draft: ActivityDraft) -> RepoResult<Activity>;
    /// Removes one activity; `NotFound` for unknown or already removed ids.
    fn remove(&self, id: ActivityId) -> RepoResult<()>;
}

impl<T: ActivityList + ?Sized> ActivityList for &T {
    fn list(&self) -> RepoResult<Vec<Activity>> {
        (**self).list()
    }

    fn create(&self, draft: ActivityDraft) -> RepoResult<Activity> {
        (**self).create(draft)
    }

    fn remove(&self, id: ActivityId) -> RepoResult<()> {
        (**self).remove(id)
    }
}

/// SQLite-backed activity list.
pub struct SqliteActivityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActivityRepository<'conn> {
    /// Constructs a repository over a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table(conn, "activities")?;
        Ok(Self { conn })
    }
}

impl ActivityList for SqliteActivityRepository<'_> {
    fn list(&self) -> RepoResult<Vec<Activity>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, week_number, year, fields
             FROM activities
             ORDER BY rowid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut activities = Vec::new();
        while let Some(row) = rows.next()? {
            activities.push(parse_activity_row(row)?);
        }
        Ok(activities)
    }

    fn create(&self, draft: ActivityDraft) -> RepoResult<Activity> {
        draft.validate()?;

        let activity = draft.into_activity(Uuid::new_v4());
        let fields = serde_json::to_string(&activity.fields)
            .map_err(|err| RepoError::InvalidData(format!("fields are not serializable: {err}")))?;

        self.conn.execute(
            "INSERT INTO activities (uuid, week_number, year, fields)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                activity.id.to_string(),
                activity.week_number,
                activity.year,
                fields,
            ],
        )?;

        debug!(
            "event=activity_create module=repo status=ok week_key={}",
            activity.week_key()
        );
        Ok(activity)
    }

    fn remove(&self, id: ActivityId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM activities WHERE uuid = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<Activity> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in activities.uuid"
        ))
    })?;

    let fields_text: String = row.get("fields")?;
    let fields = match serde_json::from_str::<Value>(&fields_text) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            return Err(RepoError::InvalidData(format!(
                "activities.fields of {id} is not a JSON object"
            )));
        }
    };

    let activity = Activity {
        id,
        week_number: row.get("week_number")?,
        year: row.get("year")?,
        fields,
    };
    activity.validate()?;
    Ok(activity)
}
