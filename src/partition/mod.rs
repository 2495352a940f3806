//! Dataset partitioning.
//!
//! Splits a dataset into disjoint subsets by the value of one grouping column,
//! writes each subset as `<name>.csv` and then writes the manifest listing them.
//!
//! # Example
//!
//! ```ignore
//! use htc_forge::partition::{PartitionConfig, Partitioner};
//!
//! let config = PartitionConfig::new("data/raw.csv", "species", "data/subsets");
//! let summary = Partitioner::new(config).run()?;
//! println!("{} subsets", summary.subsets.len());
//! ```

pub mod dataset;
pub mod manifest;

pub use dataset::Dataset;
pub use manifest::{Manifest, MANIFEST_HEADER, SUBSET_EXTENSION};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, UInt64Array};
use arrow::compute::{cast, take};
use arrow::csv::WriterBuilder;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PartitionError;
use crate::output::write_atomic;

/// Subset that collects records whose grouping value is null or empty.
pub const MISSING_KEY_SUBSET: &str = "NA";

/// Default manifest file name.
pub const DEFAULT_MANIFEST: &str = "manifest.csv";

/// Order in which subsets are materialized and listed in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubsetOrder {
    /// Order of first appearance in the dataset.
    #[default]
    Discovery,
    /// Lexicographic by subset name.
    Sorted,
}

/// Records sharing one grouping value.
#[derive(Debug, Clone)]
pub struct Subset {
    pub name: String,
    pub batch: RecordBatch,
}

impl Subset {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, SUBSET_EXTENSION)
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Serialize as CSV with a header row.
    pub fn to_csv(&self, delimiter: u8) -> Result<Vec<u8>, PartitionError> {
        let mut buf = Vec::new();
        {
            let mut writer = WriterBuilder::new()
                .with_header(true)
                .with_delimiter(delimiter)
                .build(&mut buf);
            writer.write(&self.batch)?;
        }
        Ok(buf)
    }
}

/// Result of partitioning: subsets in materialization order plus their manifest.
#[derive(Debug, Clone)]
pub struct Partition {
    subsets: Vec<Subset>,
    manifest: Manifest,
}

impl Partition {
    pub fn subsets(&self) -> &[Subset] {
        &self.subsets
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn get(&self, name: &str) -> Option<&Subset> {
        self.subsets.iter().find(|subset| subset.name == name)
    }

    pub fn len(&self) -> usize {
        self.subsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsets.is_empty()
    }

    /// Mapping from subset name to subset.
    pub fn by_name(&self) -> HashMap<&str, &Subset> {
        self.subsets
            .iter()
            .map(|subset| (subset.name.as_str(), subset))
            .collect()
    }
}

/// Check that a grouping value can be used as a subset file stem.
pub fn validate_subset_name(name: &str) -> Result<(), PartitionError> {
    let invalid = |reason: &str| PartitionError::InvalidSubsetName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name is a relative directory"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '"' | ',') || c.is_control())
    {
        return Err(invalid(&format!("contains forbidden character {:?}", c)));
    }
    Ok(())
}

/// Split `dataset` by the values of `grouping_key`.
///
/// Every record ends up in exactly one subset. Null or empty grouping values
/// are collected under [`MISSING_KEY_SUBSET`].
pub fn partition(
    dataset: &Dataset,
    grouping_key: &str,
    order: SubsetOrder,
) -> Result<Partition, PartitionError> {
    let schema = dataset.schema();
    let column_index = schema
        .index_of(grouping_key)
        .map_err(|_| PartitionError::Schema {
            column: grouping_key.to_string(),
            available: dataset.column_names().join(", "),
        })?;

    let batch = dataset.batch();
    if batch.num_rows() == 0 {
        return Err(PartitionError::EmptyDataset);
    }

    let keys = cast(batch.column(column_index).as_ref(), &DataType::Utf8)?;
    let keys = keys.as_string::<i32>();

    let mut groups: Vec<(String, Vec<u64>)> = Vec::new();
    let mut lookup: HashMap<String, usize> = HashMap::new();
    let mut missing = 0usize;

    for row in 0..batch.num_rows() {
        let name = if keys.is_null(row) || keys.value(row).is_empty() {
            missing += 1;
            MISSING_KEY_SUBSET
        } else {
            keys.value(row)
        };

        let slot = match lookup.get(name) {
            Some(&slot) => slot,
            None => {
                validate_subset_name(name)?;
                lookup.insert(name.to_string(), groups.len());
                groups.push((name.to_string(), Vec::new()));
                groups.len() - 1
            }
        };
        groups[slot].1.push(row as u64);
    }

    if missing > 0 {
        warn!(
            column = grouping_key,
            rows = missing,
            subset = MISSING_KEY_SUBSET,
            "Records with a missing grouping value"
        );
    }

    if order == SubsetOrder::Sorted {
        groups.sort_by(|a, b| a.0.cmp(&b.0));
    }

    let subsets = groups
        .into_iter()
        .map(|(name, rows)| {
            let indices = UInt64Array::from(rows);
            let columns = batch
                .columns()
                .iter()
                .map(|column| take(column.as_ref(), &indices, None))
                .collect::<Result<Vec<ArrayRef>, _>>()?;
            let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;
            Ok(Subset { name, batch })
        })
        .collect::<Result<Vec<_>, PartitionError>>()?;

    let manifest = Manifest::from_subset_names(subsets.iter().map(|subset| subset.name.as_str()));

    debug!(
        column = grouping_key,
        subsets = subsets.len(),
        rows = batch.num_rows(),
        "Partitioned dataset"
    );

    Ok(Partition { subsets, manifest })
}

/// Write every subset into `dir`, then the manifest at `manifest_path`.
///
/// All file contents are serialized before the first write, and each file is
/// written atomically.
pub fn write_partition(
    partition: &Partition,
    dir: &Path,
    manifest_path: &Path,
    delimiter: u8,
) -> Result<Vec<PathBuf>, PartitionError> {
    let mut files = partition
        .subsets()
        .iter()
        .map(|subset| Ok((dir.join(subset.file_name()), subset.to_csv(delimiter)?)))
        .collect::<Result<Vec<_>, PartitionError>>()?;
    files.push((manifest_path.to_path_buf(), partition.manifest().to_csv()?));

    std::fs::create_dir_all(dir)?;
    for (path, bytes) in &files {
        write_atomic(path, bytes, false)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote partition file");
    }

    Ok(files.into_iter().map(|(path, _)| path).collect())
}

fn default_delimiter() -> char {
    ','
}

/// Settings for one partitioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub input: PathBuf,
    pub group_by: String,
    pub output_dir: PathBuf,
    /// Manifest location; defaults to `manifest.csv` inside `output_dir`.
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    #[serde(default)]
    pub order: SubsetOrder,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl PartitionConfig {
    pub fn new(
        input: impl Into<PathBuf>,
        group_by: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            group_by: group_by.into(),
            output_dir: output_dir.into(),
            manifest: None,
            order: SubsetOrder::default(),
            delimiter: default_delimiter(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.output_dir.join(DEFAULT_MANIFEST))
    }

    pub fn delimiter_byte(&self) -> Result<u8, PartitionError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or(PartitionError::InvalidDelimiter(self.delimiter))
    }
}

/// Per-subset line of a [`PartitionSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct SubsetSummary {
    pub name: String,
    pub file_name: String,
    pub rows: usize,
}

/// Outcome of a partitioning run.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    pub grouping_key: String,
    pub output_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub total_rows: usize,
    pub subsets: Vec<SubsetSummary>,
}

/// Loads a dataset, partitions it and writes the subsets and manifest.
#[derive(Debug, Clone)]
pub struct Partitioner {
    config: PartitionConfig,
}

impl Partitioner {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn run(&self) -> Result<PartitionSummary, PartitionError> {
        let delimiter = self.config.delimiter_byte()?;
        let dataset = Dataset::load(&self.config.input, delimiter)?;
        let partition = partition(&dataset, &self.config.group_by, self.config.order)?;

        let manifest_path = self.config.manifest_path();
        write_partition(&partition, &self.config.output_dir, &manifest_path, delimiter)?;

        let summary = PartitionSummary {
            grouping_key: self.config.group_by.clone(),
            output_dir: self.config.output_dir.clone(),
            manifest_path,
            total_rows: dataset.num_rows(),
            subsets: partition
                .subsets()
                .iter()
                .map(|subset| SubsetSummary {
                    name: subset.name.clone(),
                    file_name: subset.file_name(),
                    rows: subset.num_rows(),
                })
                .collect(),
        };

        info!(
            input = %self.config.input.display(),
            column = %summary.grouping_key,
            subsets = summary.subsets.len(),
            rows = summary.total_rows,
            output = %summary.output_dir.display(),
            "Wrote subsets and manifest"
        );

        Ok(summary)
    }
}
