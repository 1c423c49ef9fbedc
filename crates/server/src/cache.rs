//! Result cache keyed by query id.
//!
//! Entries are immutable once inserted. The first `put` for an id wins; later
//! puts for the same id leave the stored result untouched.
//!
//! Ids are content-addressed, so callers that submit the same plan share one
//! entry. Each entry counts the tickets handed out for it and is dropped only
//! when the last of them is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use flightdeck_core::{QueryId, ResultSet};

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Other tickets for the id are still outstanding.
    Retained { outstanding: usize },
    Evicted,
}

/// Hit/miss counters, read through [`ResultCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

struct CachedResult {
    result: Arc<ResultSet>,
    issued: usize,
}

#[derive(Default)]
pub struct ResultCache {
    entries: DashMap<QueryId, CachedResult>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `result` and count one issued ticket for `id`.
    pub fn put(&self, id: QueryId, result: Arc<ResultSet>) -> PutOutcome {
        match self.entries.entry(id) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().issued += 1;
                debug!(query_id = %id, "result already cached, keeping first");
                PutOutcome::AlreadyPresent
            }
            Entry::Vacant(slot) => {
                slot.insert(CachedResult { result, issued: 1 });
                PutOutcome::Inserted
            }
        }
    }

    /// Count one more issued ticket for an existing entry. Returns `false`
    /// when nothing is cached for `id`.
    pub fn acquire(&self, id: &QueryId) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.issued += 1;
                true
            }
            None => false,
        }
    }

    /// Shared handle to a cached result. The entry stays in place.
    pub fn get(&self, id: &QueryId) -> Result<Arc<ResultSet>, ServiceError> {
        match self.entries.get(id) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(entry.result.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Err(ServiceError::NotFound(format!("no cached result for query {id}")))
            }
        }
    }

    /// Give back one issued ticket. The entry is removed with the last one.
    pub fn release(&self, id: &QueryId) -> Result<ReleaseOutcome, ServiceError> {
        match self.entries.entry(*id) {
            Entry::Occupied(mut slot) => {
                let outstanding = {
                    let entry = slot.get_mut();
                    entry.issued = entry.issued.saturating_sub(1);
                    entry.issued
                };
                if outstanding == 0 {
                    slot.remove();
                    Ok(ReleaseOutcome::Evicted)
                } else {
                    Ok(ReleaseOutcome::Retained { outstanding })
                }
            }
            Entry::Vacant(_) => Err(ServiceError::NotFound(format!("no cached result for query {id}"))),
        }
    }

    pub fn contains(&self, id: &QueryId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
