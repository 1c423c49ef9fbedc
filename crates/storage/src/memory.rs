//! In-memory table provider.
//!
//! Holds named tables as Arrow batches. A plan is a UTF-8 dataset reference
//! and executes as a full scan of that dataset.

use std::collections::BTreeMap;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use flightdeck_core::{Dataset, Plan, ResultSet};

use crate::backend::{Capabilities, CreateOutcome, StorageBackend};
use crate::error::StorageError;

struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<BTreeMap<String, Table>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend pre-populated with `(name, schema, batches)` tables.
    pub fn with_tables(
        tables: impl IntoIterator<Item = (String, SchemaRef, Vec<RecordBatch>)>,
    ) -> Result<Self, StorageError> {
        let mut map = BTreeMap::new();
        for (name, schema, batches) in tables {
            // validates that every batch matches the declared schema
            ResultSet::try_new(schema.clone(), batches.clone())?;
            map.insert(name, Table { schema, batches });
        }
        Ok(Self {
            tables: RwLock::new(map),
        })
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            create_dataset: true,
        }
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .iter()
            .map(|(name, t)| Dataset::from_batches(name.clone(), t.schema.clone(), &t.batches))
            .collect())
    }

    async fn describe_dataset(&self, name: &str) -> Result<Dataset, StorageError> {
        let tables = self.tables.read().await;
        tables
            .get(name)
            .map(|t| Dataset::from_batches(name, t.schema.clone(), &t.batches))
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn execute(&self, plan: &Plan) -> Result<ResultSet, StorageError> {
        let reference = plan
            .as_utf8()
            .ok_or_else(|| StorageError::Execution("plan is not valid UTF-8".to_string()))?
            .trim();
        if reference.is_empty() {
            return Err(StorageError::Execution("empty plan".to_string()));
        }

        debug!(dataset = %reference, "scanning in-memory table");
        let tables = self.tables.read().await;
        let table = tables.get(reference).ok_or_else(|| {
            StorageError::Execution(format!("missing dataset reference '{reference}'"))
        })?;

        Ok(ResultSet::try_new(table.schema.clone(), table.batches.clone())?)
    }

    async fn create_dataset(
        &self,
        name: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        replace: bool,
    ) -> Result<CreateOutcome, StorageError> {
        ResultSet::try_new(schema.clone(), batches.clone())?;

        let mut tables = self.tables.write().await;
        let existed = tables.contains_key(name);
        if existed && !replace {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        tables.insert(name.to_string(), Table { schema, batches });

        Ok(if existed {
            CreateOutcome::Replaced
        } else {
            CreateOutcome::Created
        })
    }
}
