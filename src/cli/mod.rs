//! Command-line interface for reason-forge.
//!
//! Provides the `repair` command, which runs one tree search, and the
//! `check` command, which evaluates a single candidate.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
