//! Command-line interface for crawl-dispatch.
//!
//! Provides commands for running a dispatch pass, checking the queue gate,
//! and applying the database schema.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
