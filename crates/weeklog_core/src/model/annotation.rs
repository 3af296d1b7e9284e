//! Per-day annotation model.
//!
//! # Responsibility
//! - Define the composite key that addresses one stored annotation.
//! - Own the naming convention of the 14 reserved export field names.
//!
//! # Invariants
//! - `DayIndex` is always within `0..=6`.
//! - For one `(kind, week, day)` key at most one value exists; last write wins.
//! - `PositiveNotes` values are structured JSON, `FreeWriting` values are text.

use crate::model::activity::WeekKey;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt::{Display, Formatter};

static RESERVED_FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(positiveNotes|freeWriting)-([0-6])$").expect("valid reserved field regex")
});

/// Number of tracked days per week.
pub const DAYS_PER_WEEK: u8 = 7;

/// Annotation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationKind {
    /// Structured per-day positive notes, opaque JSON to core.
    PositiveNotes,
    /// Free-form per-day text.
    FreeWriting,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 2] = [AnnotationKind::PositiveNotes, AnnotationKind::FreeWriting];

    /// Wire/storage prefix of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PositiveNotes => "positiveNotes",
            Self::FreeWriting => "freeWriting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "positiveNotes" => Some(Self::PositiveNotes),
            "freeWriting" => Some(Self::FreeWriting),
            _ => None,
        }
    }
}

impl Display for AnnotationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero-based day position inside a week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayIndex(u8);

impl DayIndex {
    pub const ALL: [DayIndex; DAYS_PER_WEEK as usize] = [
        DayIndex(0),
        DayIndex(1),
        DayIndex(2),
        DayIndex(3),
        DayIndex(4),
        DayIndex(5),
        DayIndex(6),
    ];

    /// Returns `None` when `value` is outside `0..=6`.
    pub fn new(value: u8) -> Option<Self> {
        (value < DAYS_PER_WEEK).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Display for DayIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structural composite key of one stored annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationKey {
    pub kind: AnnotationKind,
    pub week: WeekKey,
    pub day: DayIndex,
}

impl AnnotationKey {
    pub fn new(kind: AnnotationKind, week: WeekKey, day: DayIndex) -> Self {
        Self { kind, week, day }
    }

    /// Legacy flat encoding `"<kind>-<weekKey>-<day>"`.
    ///
    /// Only used for diagnostics; storage addresses keys structurally.
    pub fn storage_key(&self) -> String {
        format!("{}-{}-{}", self.kind, self.week, self.day)
    }

    /// Export field name this key maps to.
    pub fn field(&self) -> ReservedField {
        ReservedField::new(self.kind, self.day)
    }

    /// All 14 keys of one week, day-major then kind order.
    pub fn all_for_week(week: WeekKey) -> impl Iterator<Item = AnnotationKey> {
        DayIndex::ALL.into_iter().flat_map(move |day| {
            AnnotationKind::ALL
                .into_iter()
                .map(move |kind| AnnotationKey::new(kind, week, day))
        })
    }
}

impl Display for AnnotationKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Stored annotation payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// Value of `AnnotationKind::PositiveNotes`.
    Structured(Value),
    /// Value of `AnnotationKind::FreeWriting`.
    Text(String),
}

impl AnnotationValue {
    /// Kind that owns this value shape.
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Structured(_) => AnnotationKind::PositiveNotes,
            Self::Text(_) => AnnotationKind::FreeWriting,
        }
    }

    /// Returns whether this is free writing with no text.
    ///
    /// Stored structured values are always exported, even `null` or `0`.
    pub fn is_empty_text(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }

    pub fn into_json(self) -> Value {
        match self {
            Self::Structured(value) => value,
            Self::Text(text) => Value::String(text),
        }
    }
}

/// Returns whether an incoming JSON value is treated as "no annotation".
///
/// Follows the falsy check of the legacy store: `null`, `false`, `0` and the
/// empty string carry no annotation.
pub fn is_blank_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// One of the 14 reserved export field names (`<kind>-<day>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservedField {
    pub kind: AnnotationKind,
    pub day: DayIndex,
}

impl ReservedField {
    pub fn new(kind: AnnotationKind, day: DayIndex) -> Self {
        Self { kind, day }
    }

    /// Parses an exact reserved field name; anything else is `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = RESERVED_FIELD_RE.captures(name)?;
        let kind = AnnotationKind::parse(caps.get(1)?.as_str())?;
        let day = caps.get(2)?.as_str().parse::<u8>().ok()?;
        Some(Self::new(kind, DayIndex::new(day)?))
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.kind, self.day)
    }

    pub fn key_for(&self, week: WeekKey) -> AnnotationKey {
        AnnotationKey::new(self.kind, week, self.day)
    }
}

impl Display for ReservedField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.kind, self.day)
    }
}

/// Lists every reserved export field name.
pub fn reserved_field_names() -> Vec<String> {
    DayIndex::ALL
        .into_iter()
        .flat_map(|day| {
            AnnotationKind::ALL
                .into_iter()
                .map(move |kind| ReservedField::new(kind, day).name())
        })
        .collect()
}
