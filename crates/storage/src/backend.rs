use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use flightdeck_core::{Dataset, Plan, ResultSet};

use crate::error::StorageError;

/// What a backend can do beyond listing and executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Whether `create_dataset` can ever succeed on this backend.
    pub create_dataset: bool,
}

/// Result of a `create_dataset` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Replaced,
    /// The backend does not accept new datasets (e.g. it is a view over an
    /// external Arrow source). Nothing was written.
    Unsupported,
}

/// Pluggable executor of plans and enumerator of datasets.
///
/// The protocol layer never inspects plan bytes; each backend decides what a
/// plan means.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// All datasets currently visible. Order is stable within one call.
    async fn list_datasets(&self) -> Result<Vec<Dataset>, StorageError>;

    /// Describe one dataset; `StorageError::NotFound` if the name is unknown.
    async fn describe_dataset(&self, name: &str) -> Result<Dataset, StorageError>;

    /// Run a plan to completion. Failures are `StorageError::Execution`.
    async fn execute(&self, plan: &Plan) -> Result<ResultSet, StorageError>;

    /// Register a new dataset from batches.
    async fn create_dataset(
        &self,
        _name: &str,
        _schema: SchemaRef,
        _batches: Vec<RecordBatch>,
        _replace: bool,
    ) -> Result<CreateOutcome, StorageError> {
        Ok(CreateOutcome::Unsupported)
    }
}

/// Normalize a file-derived dataset name: path and statement separators become `_`.
pub fn normalize_dataset_name(raw: &str) -> String {
    raw.replace(['/', '\\', ';'], "_")
}
