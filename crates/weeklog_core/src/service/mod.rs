//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep CLI/FFI hosts decoupled from storage details.

pub mod reconciliation_service;
