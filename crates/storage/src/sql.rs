//! Embedded relational engine backed by DataFusion.
//!
//! A plan is UTF-8 SQL text. Plans run read-only: DDL, DML and session
//! statements are rejected as execution errors. Tables are registered through
//! `create_dataset`, unless the backend was opened over an external Arrow
//! source, in which case the table set is fixed.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::MemTable;
use datafusion::execution::context::SQLOptions;
use datafusion::prelude::SessionContext;
use datafusion::sql::TableReference;
use tracing::{debug, info};

use flightdeck_core::{Dataset, Plan, ResultSet};

use crate::backend::{Capabilities, CreateOutcome, StorageBackend};
use crate::error::StorageError;

const DEFAULT_CATALOG: &str = "datafusion";
const DEFAULT_SCHEMA: &str = "public";

pub struct SqlBackend {
    ctx: SessionContext,
    /// Opened over an external Arrow source: no table creation.
    source_backed: bool,
}

impl Default for SqlBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlBackend {
    /// A fresh, empty, mutable database.
    pub fn new() -> Self {
        Self {
            ctx: SessionContext::new(),
            source_backed: false,
        }
    }

    /// A database whose queries are directed at the given Arrow tables. The
    /// table set is fixed; `create_dataset` answers `Unsupported`.
    pub fn over_source(
        tables: impl IntoIterator<Item = (String, SchemaRef, Vec<RecordBatch>)>,
    ) -> Result<Self, StorageError> {
        let ctx = SessionContext::new();
        for (name, schema, batches) in tables {
            let table = MemTable::try_new(schema, vec![batches])?;
            ctx.register_table(TableReference::bare(name.as_str()), Arc::new(table))?;
        }
        Ok(Self {
            ctx,
            source_backed: true,
        })
    }

    fn table_names(&self) -> Vec<String> {
        let mut names = self
            .ctx
            .catalog(DEFAULT_CATALOG)
            .and_then(|catalog| catalog.schema(DEFAULT_SCHEMA))
            .map(|schema| schema.table_names())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn table_exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.ctx.table_exist(TableReference::bare(name))?)
    }

    fn query_options() -> SQLOptions {
        SQLOptions::new()
            .with_allow_ddl(false)
            .with_allow_dml(false)
            .with_allow_statements(false)
    }
}

#[async_trait]
impl StorageBackend for SqlBackend {
    fn name(&self) -> &str {
        "sql"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            create_dataset: !self.source_backed,
        }
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>, StorageError> {
        let mut datasets = Vec::new();
        for name in self.table_names() {
            match self.describe_dataset(&name).await {
                Ok(ds) => datasets.push(ds),
                // dropped between listing and describing
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(datasets)
    }

    async fn describe_dataset(&self, name: &str) -> Result<Dataset, StorageError> {
        if !self.table_exists(name)? {
            return Err(StorageError::NotFound(name.to_string()));
        }
        let df = self.ctx.table(TableReference::bare(name)).await?;
        let schema = df.schema().inner().clone();
        let batches = df.collect().await?;
        Ok(Dataset::from_batches(name, schema, &batches))
    }

    async fn execute(&self, plan: &Plan) -> Result<ResultSet, StorageError> {
        let sql = plan
            .as_utf8()
            .ok_or_else(|| StorageError::Execution("plan is not valid UTF-8 SQL".to_string()))?
            .trim();
        if sql.is_empty() {
            return Err(StorageError::Execution("empty plan".to_string()));
        }

        debug!(sql = %sql, "executing SQL plan");
        let df = self
            .ctx
            .sql_with_options(sql, Self::query_options())
            .await
            .map_err(|e| StorageError::Execution(e.to_string()))?;
        let logical_schema = df.schema().inner().clone();
        let batches = df
            .collect()
            .await
            .map_err(|e| StorageError::Execution(e.to_string()))?;

        // physical output may differ from the logical schema in nullability
        let schema = batches
            .first()
            .map(|b| b.schema())
            .unwrap_or(logical_schema);
        Ok(ResultSet::try_new(schema, batches)?)
    }

    async fn create_dataset(
        &self,
        name: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        replace: bool,
    ) -> Result<CreateOutcome, StorageError> {
        if self.source_backed {
            info!(dataset = %name, "refusing table creation on source-backed database");
            return Ok(CreateOutcome::Unsupported);
        }

        let existed = self.table_exists(name)?;
        if existed && !replace {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }

        let table = MemTable::try_new(schema, vec![batches])?;
        if existed {
            self.ctx.deregister_table(TableReference::bare(name))?;
        }
        self.ctx
            .register_table(TableReference::bare(name), Arc::new(table))?;

        Ok(if existed {
            CreateOutcome::Replaced
        } else {
            CreateOutcome::Created
        })
    }
}
