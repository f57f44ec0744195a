//! rf-core: shared types, errors, configuration, parameters, and events.
//!
//! This crate is the foundational dependency for the other rf-* crates,
//! providing the unified error type, workflow/stage enums, the mutable
//! parameter store with launch-time snapshots, application configuration,
//! and a broadcast event bus for collaborator surfaces.

pub mod config;
pub mod error;
pub mod events;
pub mod params;
pub mod types;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use types::*;
