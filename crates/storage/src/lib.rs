pub mod backend;
pub mod csv;
pub mod error;
pub mod memory;
pub mod sql;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

pub use backend::{normalize_dataset_name, Capabilities, CreateOutcome, StorageBackend};
pub use csv::{CsvLoader, CsvTable};
pub use error::StorageError;
pub use memory::MemoryBackend;
pub use sql::SqlBackend;

/// High-level storage engine: config-selected backend plus its data directory.
pub struct StorageEngine {
    pub backend: Arc<dyn StorageBackend>,
    pub data_dir: PathBuf,
}

impl StorageEngine {
    /// Create a StorageEngine from config. Selects the SQL or in-memory backend.
    pub fn from_config(config: &flightdeck_core::config::StorageConfig) -> Result<Self, StorageError> {
        let backend: Arc<dyn StorageBackend> = match config.backend.as_str() {
            "sql" => Arc::new(SqlBackend::new()),
            "memory" => Arc::new(MemoryBackend::new()),
            other => {
                return Err(StorageError::NotConfigured(format!(
                    "unknown backend '{other}' (expected 'sql' or 'memory')"
                )))
            }
        };
        info!("Storage: {} backend, data dir {}", backend.name(), config.data_dir.display());

        Ok(Self {
            backend,
            data_dir: config.data_dir.clone(),
        })
    }

    pub fn with_backend(backend: Arc<dyn StorageBackend>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            data_dir: data_dir.into(),
        }
    }

    /// Load every CSV file under the data directory as a dataset, replacing
    /// same-named datasets. Returns how many were created or replaced.
    ///
    /// A file that fails to parse is skipped with a warning.
    pub async fn load_sample_data(&self) -> Result<usize, StorageError> {
        if !self.backend.capabilities().create_dataset {
            warn!(
                "Storage: {} backend does not accept new datasets; skipping sample data",
                self.backend.name()
            );
            return Ok(0);
        }

        let loader = CsvLoader::rooted_at(&self.data_dir);
        let mut loaded = 0;

        for rel_path in loader.discover() {
            let table = match loader.read_inferred(&rel_path) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Failed to read {}: {}", rel_path.display(), e);
                    continue;
                }
            };

            let rows: usize = table.batches.iter().map(|b| b.num_rows()).sum();
            let outcome = self
                .backend
                .create_dataset(&table.name, table.schema, table.batches, true)
                .await?;

            match outcome {
                CreateOutcome::Created | CreateOutcome::Replaced => {
                    info!("Loaded dataset '{}' ({} rows) from {}", table.name, rows, rel_path.display());
                    loaded += 1;
                }
                CreateOutcome::Unsupported => {
                    warn!("Backend refused dataset '{}'", table.name);
                }
            }
        }

        Ok(loaded)
    }
}
