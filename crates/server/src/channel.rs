//! Data plane: turns a ticket into the cached result's batches.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use tracing::{debug, info};

use flightdeck_core::{QueryId, ResultSet};

use crate::cache::{ReleaseOutcome, ResultCache};
use crate::error::ServiceError;

/// Lazy walk over a cached result, first batch to last.
pub struct ResultStream {
    result: Arc<ResultSet>,
    next: usize,
}

impl ResultStream {
    fn new(result: Arc<ResultSet>) -> Self {
        Self { result, next: 0 }
    }

    pub fn schema(&self) -> SchemaRef {
        self.result.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.result.num_rows()
    }
}

impl Iterator for ResultStream {
    type Item = RecordBatch;

    fn next(&mut self) -> Option<RecordBatch> {
        let batch = self.result.batches().get(self.next)?.clone();
        self.next += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.result.num_batches().saturating_sub(self.next);
        (left, Some(left))
    }
}

pub struct DataChannel {
    cache: Arc<ResultCache>,
}

impl DataChannel {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self { cache }
    }

    /// Start a fresh stream over the result behind `ticket`.
    pub fn fetch(&self, ticket: &[u8]) -> Result<ResultStream, ServiceError> {
        let id = parse_ticket(ticket)?;
        let result = self
            .cache
            .get(&id)
            .map_err(|_| ServiceError::InvalidTicket(id.to_hex()))?;
        debug!(query_id = %id, rows = result.num_rows(), "fetching result");
        Ok(ResultStream::new(result))
    }

    /// Give back one issued ticket. Once every holder has released it,
    /// later fetches fail.
    pub fn release(&self, ticket: &[u8]) -> Result<QueryId, ServiceError> {
        let id = parse_ticket(ticket)?;
        match self
            .cache
            .release(&id)
            .map_err(|_| ServiceError::InvalidTicket(id.to_hex()))?
        {
            ReleaseOutcome::Evicted => info!(query_id = %id, "released cached result"),
            ReleaseOutcome::Retained { outstanding } => {
                debug!(query_id = %id, outstanding, "ticket released, result still held")
            }
        }
        Ok(id)
    }
}

fn parse_ticket(ticket: &[u8]) -> Result<QueryId, ServiceError> {
    QueryId::from_ticket(ticket).map_err(|e| ServiceError::MalformedTicket(e.to_string()))
}
