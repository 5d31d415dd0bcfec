//! Subcommand implementations

pub mod decode;
pub mod tags;
