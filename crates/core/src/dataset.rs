use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::error::FlightdeckError;

/// A named, schema-bearing unit of data exposed by a storage backend.
///
/// Row and byte counts are a snapshot taken when the descriptor was built.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub schema: SchemaRef,
    pub row_count: u64,
    pub byte_size: u64,
}

impl Dataset {
    /// Describe a dataset from its materialized batches.
    pub fn from_batches(name: impl Into<String>, schema: SchemaRef, batches: &[RecordBatch]) -> Self {
        Self {
            name: name.into(),
            schema,
            row_count: batches.iter().map(|b| b.num_rows() as u64).sum(),
            byte_size: batches.iter().map(|b| b.get_array_memory_size() as u64).sum(),
        }
    }
}

/// Ordered, finite output of one plan execution. Every batch shares `schema`.
#[derive(Debug, Clone)]
pub struct ResultSet {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl ResultSet {
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self, FlightdeckError> {
        for (index, batch) in batches.iter().enumerate() {
            if batch.schema().fields() != schema.fields() {
                return Err(FlightdeckError::SchemaMismatch {
                    index,
                    expected: schema.to_string(),
                    actual: batch.schema().to_string(),
                });
            }
        }
        Ok(Self { schema, batches })
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: Vec::new(),
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn byte_size(&self) -> usize {
        self.batches.iter().map(|b| b.get_array_memory_size()).sum()
    }
}
