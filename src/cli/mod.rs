//! Command-line interface for workflow analysis.
//!
//! Provides commands for analysing a workflow run and inspecting a user's
//! historical data.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
