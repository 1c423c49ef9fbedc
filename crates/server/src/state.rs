use std::sync::Arc;

use flightdeck_catalog::DatasetCatalog;
use flightdeck_core::config::ServerConfig;
use flightdeck_storage::StorageBackend;

use crate::cache::ResultCache;
use crate::channel::DataChannel;
use crate::query::{QueryOptions, QueryService};

/// Everything a request handler needs. All three parts share one cache.
pub struct AppState {
    pub catalog: DatasetCatalog,
    pub queries: QueryService,
    pub data: DataChannel,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        cache: Arc<ResultCache>,
        location: impl Into<String>,
        options: QueryOptions,
    ) -> Self {
        Self {
            catalog: DatasetCatalog::new(backend.clone(), location),
            queries: QueryService::new(backend, cache.clone(), options),
            data: DataChannel::new(cache),
        }
    }

    pub fn from_config(backend: Arc<dyn StorageBackend>, config: &ServerConfig) -> Self {
        Self::new(
            backend,
            Arc::new(ResultCache::new()),
            config.location(),
            QueryOptions::from(config),
        )
    }
}
