//! Weekly activity domain model.
//!
//! # Responsibility
//! - Define activities, week keys and per-day annotation keys/values.
//! - Own the reserved export field naming convention.
//!
//! # Invariants
//! - Every activity is identified by a stable `ActivityId`.
//! - Annotations are addressed by `(kind, week, day)`, never by activity id.

pub mod activity;
pub mod annotation;
