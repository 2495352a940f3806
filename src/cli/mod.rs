//! Command-line interface for htc-forge.
//!
//! Provides commands for partitioning, bundling, rendering and checking
//! HTCondor submission artifacts.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
