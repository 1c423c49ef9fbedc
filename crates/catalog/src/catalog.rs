use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use flightdeck_core::Dataset;
use flightdeck_storage::{StorageBackend, StorageError};

use crate::error::CatalogError;

/// Path-style reference to a dataset, as carried by a flight descriptor.
///
/// Segments are joined with `/` to form the dataset name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub path: Vec<String>,
}

impl Locator {
    pub fn new(path: Vec<String>) -> Self {
        Self { path }
    }

    pub fn for_dataset(name: &str) -> Self {
        Self {
            path: vec![name.to_string()],
        }
    }

    /// The dataset name this locator refers to; `None` for an empty path.
    pub fn dataset_name(&self) -> Option<String> {
        if self.path.is_empty() || self.path.iter().all(|s| s.is_empty()) {
            None
        } else {
            Some(self.path.join("/"))
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.path.join(", "))
    }
}

/// External-facing description of one dataset: what it is and where to get it.
#[derive(Debug, Clone)]
pub struct DatasetDescriptor {
    pub dataset: Dataset,
    pub locator: Locator,
    /// URI of the service that serves this dataset.
    pub location: String,
}

/// Summary row for startup logs.
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub name: String,
    pub columns: usize,
    pub row_count: u64,
    pub byte_size: u64,
}

impl From<&DatasetDescriptor> for DatasetSummary {
    fn from(d: &DatasetDescriptor) -> Self {
        Self {
            name: d.dataset.name.clone(),
            columns: d.dataset.schema.fields().len(),
            row_count: d.dataset.row_count,
            byte_size: d.dataset.byte_size,
        }
    }
}

/// Facade that turns backend datasets into descriptors.
///
/// Nothing is cached: every call reads the backend again, so the metrics are
/// point-in-time snapshots.
pub struct DatasetCatalog {
    backend: Arc<dyn StorageBackend>,
    location: String,
}

impl DatasetCatalog {
    pub fn new(backend: Arc<dyn StorageBackend>, location: impl Into<String>) -> Self {
        Self {
            backend,
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn descriptor(&self, dataset: Dataset) -> DatasetDescriptor {
        DatasetDescriptor {
            locator: Locator::for_dataset(&dataset.name),
            location: self.location.clone(),
            dataset,
        }
    }

    /// Descriptors for every dataset currently visible, without duplicates.
    pub async fn list(&self) -> Result<Vec<DatasetDescriptor>, CatalogError> {
        let datasets = self.backend.list_datasets().await?;

        let mut seen = BTreeSet::new();
        let descriptors: Vec<DatasetDescriptor> = datasets
            .into_iter()
            .filter(|d| seen.insert(d.name.clone()))
            .map(|d| self.descriptor(d))
            .collect();

        info!(
            "Catalog listed: {} datasets from {} backend ({} rows total)",
            descriptors.len(),
            self.backend.name(),
            descriptors.iter().map(|d| d.dataset.row_count).sum::<u64>()
        );
        Ok(descriptors)
    }

    /// Resolve a locator to its descriptor.
    pub async fn resolve(&self, locator: &Locator) -> Result<DatasetDescriptor, CatalogError> {
        let name = locator
            .dataset_name()
            .ok_or_else(|| CatalogError::NotFound(locator.to_string()))?;
        debug!(dataset = %name, "resolving locator");
        self.describe(&name).await
    }

    pub async fn describe(&self, name: &str) -> Result<DatasetDescriptor, CatalogError> {
        match self.backend.describe_dataset(name).await {
            Ok(dataset) => Ok(self.descriptor(dataset)),
            Err(StorageError::NotFound(n)) => Err(CatalogError::NotFound(n)),
            Err(e) => Err(e.into()),
        }
    }
}
