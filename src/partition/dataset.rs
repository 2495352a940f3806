//! Tabular dataset loading.
//!
//! CSV columns are read as text so values are written back to the subset
//! files exactly as they appeared in the input. Parquet keeps its native
//! column types.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use crate::error::PartitionError;

/// An in-memory table of records.
#[derive(Debug, Clone)]
pub struct Dataset {
    batch: RecordBatch,
}

impl Dataset {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Self, PartitionError> {
        let batch = concat_batches(&schema, batches)?;
        Ok(Self { batch })
    }

    /// Load a dataset, choosing the reader from the file extension.
    pub fn load(path: impl AsRef<Path>, delimiter: u8) -> Result<Self, PartitionError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("csv") | Some("tsv") | Some("txt") => Self::read_csv(path, delimiter),
            Some("parquet") => Self::read_parquet(path),
            _ => Err(PartitionError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Read a delimited text file with a header row.
    pub fn read_csv(path: impl AsRef<Path>, delimiter: u8) -> Result<Self, PartitionError> {
        let path = path.as_ref();
        let format = Format::default()
            .with_header(true)
            .with_delimiter(delimiter);
        let (inferred, _) = format.infer_schema(File::open(path)?, None)?;

        let fields: Vec<Field> = inferred
            .fields()
            .iter()
            .map(|field| Field::new(field.name(), DataType::Utf8, true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        if schema.fields().is_empty() {
            return Ok(Self::new(RecordBatch::new_empty(schema)));
        }

        let reader = ReaderBuilder::new(Arc::clone(&schema))
            .with_header(true)
            .with_delimiter(delimiter)
            .build(File::open(path)?)?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;

        let dataset = Self::from_batches(schema, &batches)?;
        debug!(
            path = %path.display(),
            rows = dataset.num_rows(),
            columns = dataset.column_names().len(),
            "Loaded CSV dataset"
        );
        Ok(dataset)
    }

    pub fn read_parquet(path: impl AsRef<Path>) -> Result<Self, PartitionError> {
        let path = path.as_ref();
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
        let schema = Arc::clone(builder.schema());
        let reader = builder.build()?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;

        let dataset = Self::from_batches(schema, &batches)?;
        debug!(
            path = %path.display(),
            rows = dataset.num_rows(),
            "Loaded Parquet dataset"
        );
        Ok(dataset)
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect()
    }
}
