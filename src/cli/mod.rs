//! Command-line interface for curator.
//!
//! Provides commands for running manifests and inspecting a persisted registry.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
