//! Control plane: runs a submitted plan and streams its progress.
//!
//! Each submission runs on its own task and walks
//! `Received -> Executing -> Completed | Failed`. Messages go out over a
//! bounded channel in emission order. Exactly one terminal message (a ticket
//! or an error) closes the stream. The ticket is sent only after the result
//! is in the cache and counted against it, so any ticket a caller sees can be
//! fetched until that caller releases it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use flightdeck_core::config::ServerConfig;
use flightdeck_core::{Plan, PlanHasher, QueryId, ResultSet};
use flightdeck_storage::{StorageBackend, StorageError};

use crate::cache::{PutOutcome, ResultCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Received,
    Executed,
    Cached,
}

impl Progress {
    pub fn as_str(&self) -> &'static str {
        match self {
            Progress::Received => "received",
            Progress::Executed => "executed",
            Progress::Cached => "cached",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Progress(Progress),
    Ticket(QueryId),
    Error(String),
}

impl ControlMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ControlMessage::Progress(_))
    }

    /// Wire body: progress text, the ticket hex, or the diagnostic.
    pub fn payload(&self) -> Bytes {
        match self {
            ControlMessage::Progress(p) => Bytes::from_static(p.as_str().as_bytes()),
            ControlMessage::Ticket(id) => id.to_ticket(),
            ControlMessage::Error(diagnostic) => Bytes::from(diagnostic.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Received,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryState::Received => "received",
            QueryState::Executing => "executing",
            QueryState::Completed => "completed",
            QueryState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub execute_timeout: Option<Duration>,
    pub channel_capacity: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            execute_timeout: None,
            channel_capacity: 16,
        }
    }
}

impl From<&ServerConfig> for QueryOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            execute_timeout: config.execute_timeout(),
            channel_capacity: config.control_channel_capacity.max(1),
        }
    }
}

pub type ControlStream = ReceiverStream<ControlMessage>;

pub struct QueryService {
    backend: Arc<dyn StorageBackend>,
    cache: Arc<ResultCache>,
    options: QueryOptions,
    active: Arc<AtomicUsize>,
}

impl QueryService {
    pub fn new(backend: Arc<dyn StorageBackend>, cache: Arc<ResultCache>, options: QueryOptions) -> Self {
        Self {
            backend,
            cache,
            options,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Submissions whose task has not finished yet.
    pub fn active_queries(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Start running `plan` and return its message stream.
    ///
    /// Must be called from within a Tokio runtime. Dropping the stream before
    /// the terminal message cancels any execution still in flight.
    pub fn submit(&self, plan: Plan) -> ControlStream {
        let (tx, rx) = mpsc::channel(self.options.channel_capacity.max(1));
        let session = Session {
            id: PlanHasher::hash(&plan),
            plan,
            backend: self.backend.clone(),
            cache: self.cache.clone(),
            timeout: self.options.execute_timeout,
            tx,
            _guard: ActiveGuard::enter(&self.active),
        };
        tokio::spawn(session.run());
        ReceiverStream::new(rx)
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Caller dropped its end of the stream.
struct Disconnected;

struct Session {
    id: QueryId,
    plan: Plan,
    backend: Arc<dyn StorageBackend>,
    cache: Arc<ResultCache>,
    timeout: Option<Duration>,
    tx: mpsc::Sender<ControlMessage>,
    _guard: ActiveGuard,
}

impl Session {
    async fn run(self) {
        if self.drive().await.is_err() {
            info!(query_id = %self.id, "caller went away; query abandoned");
        }
    }

    async fn drive(&self) -> Result<(), Disconnected> {
        self.enter(QueryState::Received);
        self.emit(ControlMessage::Progress(Progress::Received)).await?;

        if self.cache.acquire(&self.id) {
            if let Err(gone) = self.emit(ControlMessage::Progress(Progress::Cached)).await {
                self.abandon_ticket();
                return Err(gone);
            }
            self.enter(QueryState::Completed);
            return self.issue_ticket().await;
        }

        self.enter(QueryState::Executing);
        let outcome = tokio::select! {
            outcome = self.execute() => outcome,
            _ = self.tx.closed() => return Err(Disconnected),
        };

        match outcome {
            Ok(result) => {
                let rows = result.num_rows();
                if self.cache.put(self.id, Arc::new(result)) == PutOutcome::AlreadyPresent {
                    debug!(query_id = %self.id, "concurrent submission cached first");
                }
                if let Err(gone) = self.emit(ControlMessage::Progress(Progress::Executed)).await {
                    self.abandon_ticket();
                    return Err(gone);
                }
                self.enter(QueryState::Completed);
                info!(query_id = %self.id, rows, "query completed");
                self.issue_ticket().await
            }
            Err(diagnostic) => {
                self.enter(QueryState::Failed);
                warn!(query_id = %self.id, error = %diagnostic, "query failed");
                self.emit(ControlMessage::Error(diagnostic)).await
            }
        }
    }

    async fn execute(&self) -> Result<ResultSet, String> {
        let fut = self.backend.execute(&self.plan);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(format!("execution timed out after {}s", limit.as_secs_f64())),
            },
            None => fut.await,
        };
        outcome.map_err(diagnostic)
    }

    fn enter(&self, state: QueryState) {
        debug!(query_id = %self.id, plan_bytes = self.plan.len(), %state, "query state");
    }

    /// Send the ticket counted for this session. If nobody receives it, the
    /// count is given back.
    async fn issue_ticket(&self) -> Result<(), Disconnected> {
        let sent = self.emit(ControlMessage::Ticket(self.id)).await;
        if sent.is_err() {
            self.abandon_ticket();
        }
        sent
    }

    fn abandon_ticket(&self) {
        let _ = self.cache.release(&self.id);
    }

    async fn emit(&self, msg: ControlMessage) -> Result<(), Disconnected> {
        self.tx.send(msg).await.map_err(|_| Disconnected)
    }
}

/// Backend diagnostics are surfaced verbatim.
fn diagnostic(err: StorageError) -> String {
    match err {
        StorageError::Execution(msg) => msg,
        other => other.to_string(),
    }
}
