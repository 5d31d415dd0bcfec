//! Library entry for bitbind-cli used by integration tests and embedding.

pub mod commands;
pub mod schema;

// Re-export commands for convenience
pub use commands::*;

pub use crate::schema::{parse_override, Schema};
