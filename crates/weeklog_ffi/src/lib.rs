//! Flutter-facing bindings for weeklog core.

pub mod api;
