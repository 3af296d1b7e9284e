//! Activity domain model.
//!
//! # Responsibility
//! - Define the weekly activity record owned by `ActivityList`.
//! - Derive the `WeekKey` used to namespace per-day annotations.
//!
//! # Invariants
//! - `id` is assigned by the activity list and never reused.
//! - `week_number` stays within `1..=53`.
//! - `fields` never carries `id`, `weekNumber`, `year`, or a reserved
//!   annotation field name.

use crate::model::annotation::ReservedField;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier assigned by `ActivityList::create`.
pub type ActivityId = Uuid;

/// Field name carrying the activity identifier on the wire.
pub const ID_FIELD: &str = "id";
/// Field name carrying the ISO-like week number on the wire.
pub const WEEK_NUMBER_FIELD: &str = "weekNumber";
/// Field name carrying the calendar year on the wire.
pub const YEAR_FIELD: &str = "year";

pub const MIN_WEEK_NUMBER: u32 = 1;
pub const MAX_WEEK_NUMBER: u32 = 53;

/// Week namespace shared by all activities of the same week.
///
/// Rendered as `"<weekNumber>-<year>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekKey {
    pub week_number: u32,
    pub year: i32,
}

impl WeekKey {
    pub fn new(week_number: u32, year: i32) -> Self {
        Self { week_number, year }
    }
}

impl Display for WeekKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.week_number, self.year)
    }
}

/// One tracked item belonging to a specific week.
///
/// Domain fields other than the week coordinates are opaque to core and are
/// carried verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    #[serde(rename = "weekNumber")]
    pub week_number: u32,
    pub year: i32,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Input payload for `ActivityList::create`.
///
/// Carries everything except the identifier, which the list assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityDraft {
    pub week_number: u32,
    pub year: i32,
    pub fields: Map<String, Value>,
}

/// Validation failures for activity payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityValidationError {
    /// `weekNumber` is absent from the payload.
    MissingWeekNumber,
    /// `year` is absent from the payload.
    MissingYear,
    /// `weekNumber` is not an integer in `1..=53`.
    InvalidWeekNumber(String),
    /// `year` is not a representable integer.
    InvalidYear(String),
    /// A free-form field uses a name owned by core.
    ReservedFieldName(String),
}

impl Display for ActivityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingWeekNumber => write!(f, "activity is missing `weekNumber`"),
            Self::MissingYear => write!(f, "activity is missing `year`"),
            Self::InvalidWeekNumber(value) => write!(
                f,
                "weekNumber must be an integer in {MIN_WEEK_NUMBER}..={MAX_WEEK_NUMBER}, got `{value}`"
            ),
            Self::InvalidYear(value) => write!(f, "year must be an integer, got `{value}`"),
            Self::ReservedFieldName(name) => {
                write!(f, "field name `{name}` is reserved and cannot be an activity field")
            }
        }
    }
}

impl Error for ActivityValidationError {}

impl ActivityDraft {
    pub fn new(week_number: u32, year: i32) -> Self {
        Self {
            week_number,
            year,
            fields: Map::new(),
        }
    }

    /// Adds one free-form domain field, builder style.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builds a draft from a flat JSON object.
    ///
    /// `id` is dropped; the list assigns a fresh identifier on create.
    /// Reserved annotation names are rejected rather than stripped, callers
    /// that accept annotation channels must split them off first.
    pub fn from_object(mut object: Map<String, Value>) -> Result<Self, ActivityValidationError> {
        object.remove(ID_FIELD);
        let week_number = match object.remove(WEEK_NUMBER_FIELD) {
            Some(value) => parse_week_number(&value)?,
            None => return Err(ActivityValidationError::MissingWeekNumber),
        };
        let year = match object.remove(YEAR_FIELD) {
            Some(value) => parse_year(&value)?,
            None => return Err(ActivityValidationError::MissingYear),
        };

        let draft = Self {
            week_number,
            year,
            fields: object,
        };
        draft.validate()?;
        Ok(draft)
    }

    /// Checks week range and field-name ownership.
    pub fn validate(&self) -> Result<(), ActivityValidationError> {
        validate_week_number(self.week_number)?;
        validate_field_names(&self.fields)
    }

    pub fn week_key(&self) -> WeekKey {
        WeekKey::new(self.week_number, self.year)
    }

    /// Materializes the draft into an activity with the given identity.
    pub fn into_activity(self, id: ActivityId) -> Activity {
        Activity {
            id,
            week_number: self.week_number,
            year: self.year,
            fields: self.fields,
        }
    }
}

impl Activity {
    pub fn week_key(&self) -> WeekKey {
        WeekKey::new(self.week_number, self.year)
    }

    /// Validates persisted or incoming activity state.
    pub fn validate(&self) -> Result<(), ActivityValidationError> {
        validate_week_number(self.week_number)?;
        validate_field_names(&self.fields)
    }

    /// Renders the flat wire object: `id`, `weekNumber`, `year`, then fields.
    pub fn to_object(&self) -> Map<String, Value> {
        let mut object = Map::with_capacity(self.fields.len() + 3);
        object.insert(ID_FIELD.to_string(), Value::String(self.id.to_string()));
        object.insert(WEEK_NUMBER_FIELD.to_string(), Value::from(self.week_number));
        object.insert(YEAR_FIELD.to_string(), Value::from(self.year));
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.clone());
        }
        object
    }
}

fn validate_week_number(week_number: u32) -> Result<(), ActivityValidationError> {
    if (MIN_WEEK_NUMBER..=MAX_WEEK_NUMBER).contains(&week_number) {
        Ok(())
    } else {
        Err(ActivityValidationError::InvalidWeekNumber(
            week_number.to_string(),
        ))
    }
}

fn validate_field_names(fields: &Map<String, Value>) -> Result<(), ActivityValidationError> {
    for name in fields.keys() {
        let owned_by_core = matches!(name.as_str(), ID_FIELD | WEEK_NUMBER_FIELD | YEAR_FIELD);
        if owned_by_core || ReservedField::parse(name).is_some() {
            return Err(ActivityValidationError::ReservedFieldName(name.clone()));
        }
    }
    Ok(())
}

fn parse_week_number(value: &Value) -> Result<u32, ActivityValidationError> {
    value
        .as_u64()
        .and_then(|raw| u32::try_from(raw).ok())
        .filter(|week| (MIN_WEEK_NUMBER..=MAX_WEEK_NUMBER).contains(week))
        .ok_or_else(|| ActivityValidationError::InvalidWeekNumber(value.to_string()))
}

fn parse_year(value: &Value) -> Result<i32, ActivityValidationError> {
    value
        .as_i64()
        .and_then(|raw| i32::try_from(raw).ok())
        .ok_or_else(|| ActivityValidationError::InvalidYear(value.to_string()))
}
