//! Command-line interface for stream-fleet.
//!
//! Provides commands for producing sample entries, running a batch consumer,
//! monitoring consumer health and reporting scaling recommendations.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
