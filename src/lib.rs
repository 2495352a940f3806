//! htc-forge: submission artifact generator for HTCondor container jobs.
//!
//! This library splits a dataset into per-group subsets, writes the manifest
//! the job iterates over, packs the subsets into an input archive and renders
//! the Dockerfile, submit descriptor and executable script.

pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod partition;
pub mod render;

// Re-export commonly used error types
pub use error::{BundleError, ConfigError, ManifestError, PartitionError, RenderError};
