//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the `ActivityList` and `AnnotationStore` contracts.
//! - Isolate SQLite query details from the reconciliation engine.
//! - Provide in-memory implementations of both contracts.
//!
//! # Invariants
//! - Activity writes enforce `ActivityDraft::validate()` before persistence.
//! - Activity and annotation storage are independent; neither cascades.

pub mod activity_repo;
pub mod annotation_store;
pub mod memory;
