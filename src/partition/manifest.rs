//! Subset manifest: the one-column CSV the job script iterates over.
//!
//! Subset names never need CSV quoting (the partitioner rejects names with
//! quotes, commas or control characters), so a manifest value is either bare
//! or wrapped in a single pair of double quotes. Anything else is malformed.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::Serialize;

use crate::error::ManifestError;

/// Header of the single manifest column.
pub const MANIFEST_HEADER: &str = "filename";

/// Extension of the subset files listed in a manifest.
pub const SUBSET_EXTENSION: &str = "csv";

/// Ordered list of subset file names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Manifest {
    entries: Vec<String>,
}

impl Manifest {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Build the manifest for subsets named `names`, in that order.
    pub fn from_subset_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| format!("{}.{}", name.as_ref(), SUBSET_EXTENSION))
                .collect(),
        )
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as CSV with a `filename` header.
    pub fn to_csv(&self) -> Result<Vec<u8>, ManifestError> {
        let schema = Arc::new(Schema::new(vec![Field::new(
            MANIFEST_HEADER,
            DataType::Utf8,
            false,
        )]));
        let column: ArrayRef = Arc::new(StringArray::from(
            self.entries.iter().map(String::as_str).collect::<Vec<_>>(),
        ));
        let batch = RecordBatch::try_new(schema, vec![column])?;

        let mut buf = Vec::new();
        {
            let mut writer = WriterBuilder::new().with_header(true).build(&mut buf);
            writer.write(&batch)?;
        }
        Ok(buf)
    }

    /// Parse manifest text with the same rules the job script applies.
    ///
    /// Line 1 is the header and is always skipped. Blank lines and repeated
    /// header tokens are skipped as well.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut entries = Vec::new();

        for (index, raw) in text.lines().enumerate().skip(1) {
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            let name = raw.strip_prefix('"').unwrap_or(raw);
            let name = name.strip_suffix('"').unwrap_or(name);

            if name.is_empty() || name == MANIFEST_HEADER {
                continue;
            }

            if name.contains('"') || name.contains(',') {
                return Err(ManifestError::Parse {
                    line: index + 1,
                    content: raw.to_string(),
                    reason: "embedded quote or comma".to_string(),
                });
            }

            entries.push(name.to_string());
        }

        Ok(Self { entries })
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }
}
