//! Error types for htc-forge operations.
//!
//! Defines error types for each subsystem:
//! - Dataset partitioning and subset materialization
//! - Manifest parsing
//! - Artifact rendering (Dockerfile, submit descriptor, job script)
//! - Input bundling
//! - Project configuration

use thiserror::Error;

/// Errors that can occur while partitioning a dataset.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Grouping column '{column}' not found in dataset (available: {available})")]
    Schema { column: String, available: String },

    #[error("Dataset has no records to partition")]
    EmptyDataset,

    #[error("Subset name '{name}' cannot be used as a file name: {reason}")]
    InvalidSubsetName { name: String, reason: String },

    #[error("Invalid delimiter '{0}': must be a single ASCII character")]
    InvalidDelimiter(char),

    #[error("Unsupported dataset format for '{0}': expected .csv or .parquet")]
    UnsupportedFormat(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while reading or writing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Malformed manifest line {line} ('{content}'): {reason}")]
    Parse {
        line: usize,
        content: String,
        reason: String,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while rendering submission artifacts.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Dependency install script is missing or unreadable: {0}")]
    MissingDependencyScript(String),

    #[error("Invalid resource request for '{resource}': {reason}")]
    InvalidResourceRequest { resource: String, reason: String },

    #[error("Invalid queue count {0}: at least one job must be queued")]
    InvalidQueueCount(u32),

    #[error("Invalid runtime version '{0}': expected major.minor or major.minor.patch")]
    InvalidRuntimeVersion(String),

    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    #[error("Artifacts disagree: {0}")]
    InconsistentArtifacts(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while bundling subset files into the input archive.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Subset file listed in manifest not found: {0}")]
    MissingSubset(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading the project configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
