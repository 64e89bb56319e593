//! VBD Hub CLI - Command-line interface for the dataset indexes
//!
//! This crate provides the CLI application that ties together all VBD Hub components.

pub mod check;
pub mod config;
pub mod sync;

pub use check::{check_lines, CheckSummary, LineReport};
pub use config::{Command, Config};
pub use sync::Syncer;
