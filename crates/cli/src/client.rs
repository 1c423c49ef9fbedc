//! Flight client for a flightdeck server.
//!
//! The control loop reads a query's whole action stream before deciding
//! anything: every element but the last is progress, the last is the ticket.
//! A failed query shows up as the stream ending in an error status.

use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow_flight::error::FlightError;
use arrow_flight::{Action, FlightClient, FlightDescriptor, FlightInfo, Ticket};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use thiserror::Error;
use tonic::transport::Channel;
use tonic::Code;
use tracing::debug;

use flightdeck_core::QueryId;

pub const DEFAULT_SERVER: &str = "grpc://localhost:8815";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid server address '{0}'")]
    InvalidAddress(String),

    #[error("connection failed: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("query failed: {0}")]
    Rejected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("flight error: {0}")]
    Flight(FlightError),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

impl From<FlightError> for ClientError {
    fn from(err: FlightError) -> Self {
        match err {
            FlightError::Arrow(e) => ClientError::Arrow(e),
            other => ClientError::Flight(other),
        }
    }
}

/// A dataset as advertised by the server.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub name: String,
    pub schema: SchemaRef,
    pub total_records: i64,
    pub total_bytes: i64,
    pub location: Option<String>,
}

impl TryFrom<FlightInfo> for DatasetInfo {
    type Error = ClientError;

    fn try_from(info: FlightInfo) -> Result<Self, Self::Error> {
        let name = info
            .flight_descriptor
            .as_ref()
            .map(|d| d.path.join("/"))
            .ok_or_else(|| ClientError::Protocol("flight info without descriptor".to_string()))?;
        let location = info
            .endpoint
            .first()
            .and_then(|e| e.location.first())
            .map(|l| l.uri.clone());
        let total_records = info.total_records;
        let total_bytes = info.total_bytes;
        let schema = info.try_decode_schema()?;

        Ok(Self {
            name,
            schema: schema.into(),
            total_records,
            total_bytes,
            location,
        })
    }
}

/// What the server reported while running a query.
#[derive(Debug, Clone)]
pub struct Submission {
    pub progress: Vec<String>,
    pub query_id: QueryId,
}

impl Submission {
    pub fn ticket(&self) -> Bytes {
        self.query_id.to_ticket()
    }
}

/// A fetched result. `schema` is `None` only if the server sent no schema.
#[derive(Debug, Clone)]
pub struct FetchedResult {
    pub schema: Option<SchemaRef>,
    pub batches: Vec<RecordBatch>,
}

impl FetchedResult {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Map `grpc://` style locations onto the scheme the transport dials.
pub fn endpoint_uri(address: &str) -> String {
    let address = address.trim();
    for scheme in ["grpc+tcp://", "grpc://"] {
        if let Some(rest) = address.strip_prefix(scheme) {
            return format!("http://{rest}");
        }
    }
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

pub struct QueryClient {
    inner: FlightClient,
}

impl QueryClient {
    pub async fn connect(address: &str) -> Result<Self, ClientError> {
        let uri = endpoint_uri(address);
        let endpoint = Channel::from_shared(uri.clone())
            .map_err(|_| ClientError::InvalidAddress(address.to_string()))?;
        debug!(uri = %uri, "connecting");
        let channel = endpoint.connect().await?;
        Ok(Self::from_channel(channel))
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self {
            inner: FlightClient::new(channel),
        }
    }

    pub async fn list_datasets(&mut self) -> Result<Vec<DatasetInfo>, ClientError> {
        let infos: Vec<FlightInfo> = self.inner.list_flights(Bytes::new()).await?.try_collect().await?;
        infos.into_iter().map(DatasetInfo::try_from).collect()
    }

    pub async fn describe(&mut self, name: &str) -> Result<DatasetInfo, ClientError> {
        let path = name.split('/').map(str::to_string).collect();
        let info = self
            .inner
            .get_flight_info(FlightDescriptor::new_path(path))
            .await?;
        DatasetInfo::try_from(info)
    }

    /// Run a plan on the server and wait for its ticket.
    pub async fn submit(&mut self, plan: impl Into<Bytes>) -> Result<Submission, ClientError> {
        let stream = self.inner.do_action(Action::new("query", plan.into())).await?;
        let items: Vec<Result<Bytes, FlightError>> = stream.collect().await;
        split_control(items)
    }

    pub async fn fetch(&mut self, ticket: impl Into<Bytes>) -> Result<FetchedResult, ClientError> {
        let mut stream = self.inner.do_get(Ticket::new(ticket.into())).await?;
        let mut batches = Vec::new();
        while let Some(batch) = stream.next().await {
            batches.push(batch?);
        }
        Ok(FetchedResult {
            schema: stream.schema().cloned(),
            batches,
        })
    }

    pub async fn release(&mut self, ticket: impl Into<Bytes>) -> Result<(), ClientError> {
        let stream = self.inner.do_action(Action::new("release", ticket.into())).await?;
        let _: Vec<Bytes> = stream.try_collect().await?;
        Ok(())
    }

    /// Submit, fetch, and (unless `keep`) release the cached result.
    pub async fn query(
        &mut self,
        plan: impl Into<Bytes>,
        keep: bool,
    ) -> Result<(Submission, FetchedResult), ClientError> {
        let submission = self.submit(plan).await?;
        let result = self.fetch(submission.ticket()).await?;
        if !keep {
            self.release(submission.ticket()).await?;
        }
        Ok((submission, result))
    }
}

fn split_control(mut items: Vec<Result<Bytes, FlightError>>) -> Result<Submission, ClientError> {
    let terminal = items
        .pop()
        .ok_or_else(|| ClientError::Protocol("query stream ended without a result".to_string()))?;

    let progress = items
        .into_iter()
        .map(|item| item.map(|body| String::from_utf8_lossy(&body).into_owned()))
        .collect::<Result<Vec<_>, _>>()?;

    let ticket = terminal.map_err(|e| match e {
        FlightError::Tonic(status) if status.code() == Code::Internal => {
            ClientError::Rejected(status.message().to_string())
        }
        other => ClientError::from(other),
    })?;
    let query_id = QueryId::from_ticket(&ticket)
        .map_err(|e| ClientError::Protocol(format!("server sent a bad ticket: {e}")))?;

    Ok(Submission { progress, query_id })
}
