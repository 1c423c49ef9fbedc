use thiserror::Error;

use flightdeck_storage::StorageError;

/// Errors produced by [`DatasetCatalog`](crate::DatasetCatalog) lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no dataset at {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
