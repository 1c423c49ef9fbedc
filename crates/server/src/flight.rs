//! Arrow Flight adapter over the query, data and catalog services.
//!
//! - `DoAction("query", plan)` streams progress bodies then the ticket; a
//!   failed query ends with an `internal` status carrying the diagnostic.
//! - `DoAction("release", ticket)` drops a cached result.
//! - `DoGet(ticket)` streams the cached result as Flight data.
//! - `ListFlights`, `GetFlightInfo` and `GetSchema` describe datasets.

use std::pin::Pin;
use std::sync::Arc;

use arrow::ipc::writer::IpcWriteOptions;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::{
    ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightEndpoint, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaAsIpc, SchemaResult, Ticket,
};
use futures::{stream, Stream, StreamExt, TryStreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use flightdeck_catalog::{DatasetDescriptor, DatasetSummary, Locator};

use crate::action::{self, Action};
use crate::error::ServiceError;
use crate::query::ControlMessage;
use crate::state::AppState;

type FlightResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

#[derive(Clone)]
pub struct FlightdeckService {
    state: Arc<AppState>,
}

impl FlightdeckService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn into_server(self) -> FlightServiceServer<Self> {
        FlightServiceServer::new(self)
    }

    fn flight_info(descriptor: &DatasetDescriptor) -> Result<FlightInfo, Status> {
        let dataset = &descriptor.dataset;
        let info = FlightInfo::new()
            .try_with_schema(&dataset.schema)
            .map_err(|e| Status::internal(format!("encoding schema of {}: {e}", dataset.name)))?
            .with_descriptor(FlightDescriptor::new_path(descriptor.locator.path.clone()))
            .with_endpoint(FlightEndpoint::new().with_location(descriptor.location.clone()))
            .with_total_records(dataset.row_count as i64)
            .with_total_bytes(dataset.byte_size as i64);
        Ok(info)
    }

    async fn resolve(&self, descriptor: FlightDescriptor) -> Result<DatasetDescriptor, Status> {
        let locator = Locator::new(descriptor.path);
        self.state
            .catalog
            .resolve(&locator)
            .await
            .map_err(|e| ServiceError::from(e).into())
    }

    fn run_query(&self, plan: flightdeck_core::Plan) -> BoxedStream<arrow_flight::Result> {
        let messages = self.state.queries.submit(plan);
        let bodies = messages.map(|msg| match msg {
            ControlMessage::Error(diagnostic) => Err(Status::from(ServiceError::Execution(diagnostic))),
            other => Ok(arrow_flight::Result {
                body: other.payload(),
            }),
        });
        Box::pin(bodies)
    }
}

#[tonic::async_trait]
impl FlightService for FlightdeckService {
    type HandshakeStream = BoxedStream<HandshakeResponse>;
    type ListFlightsStream = BoxedStream<FlightInfo>;
    type DoGetStream = BoxedStream<FlightData>;
    type DoPutStream = BoxedStream<PutResult>;
    type DoActionStream = BoxedStream<arrow_flight::Result>;
    type ListActionsStream = BoxedStream<ActionType>;
    type DoExchangeStream = BoxedStream<FlightData>;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> FlightResult<Self::HandshakeStream> {
        Err(Status::unimplemented("handshake is not supported"))
    }

    async fn list_flights(&self, _request: Request<Criteria>) -> FlightResult<Self::ListFlightsStream> {
        let descriptors = self
            .state
            .catalog
            .list()
            .await
            .map_err(ServiceError::from)?;
        let infos = descriptors
            .iter()
            .map(Self::flight_info)
            .collect::<Vec<_>>();
        Ok(Response::new(Box::pin(stream::iter(infos))))
    }

    async fn get_flight_info(&self, request: Request<FlightDescriptor>) -> FlightResult<FlightInfo> {
        let descriptor = self.resolve(request.into_inner()).await?;
        Ok(Response::new(Self::flight_info(&descriptor)?))
    }

    async fn poll_flight_info(&self, _request: Request<FlightDescriptor>) -> FlightResult<PollInfo> {
        Err(Status::unimplemented("poll_flight_info is not supported"))
    }

    async fn get_schema(&self, request: Request<FlightDescriptor>) -> FlightResult<SchemaResult> {
        let descriptor = self.resolve(request.into_inner()).await?;
        let options = IpcWriteOptions::default();
        let result: SchemaResult = SchemaAsIpc::new(&descriptor.dataset.schema, &options)
            .try_into()
            .map_err(|e: arrow::error::ArrowError| Status::internal(e.to_string()))?;
        Ok(Response::new(result))
    }

    async fn do_get(&self, request: Request<Ticket>) -> FlightResult<Self::DoGetStream> {
        let ticket = request.into_inner().ticket;
        let results = self.state.data.fetch(&ticket)?;
        debug!(rows = results.num_rows(), "streaming result");

        let schema = results.schema();
        let batches = stream::iter(results.map(Ok::<_, FlightError>));
        let encoded = FlightDataEncoderBuilder::new()
            .with_schema(schema)
            .build(batches)
            .map_err(Status::from);
        Ok(Response::new(Box::pin(encoded)))
    }

    async fn do_put(&self, _request: Request<Streaming<FlightData>>) -> FlightResult<Self::DoPutStream> {
        Err(Status::unimplemented("do_put is not supported"))
    }

    async fn do_action(&self, request: Request<arrow_flight::Action>) -> FlightResult<Self::DoActionStream> {
        let action = Action::from(request.into_inner());
        debug!(kind = action.kind(), "action received");

        match action {
            Action::Query(plan) => Ok(Response::new(self.run_query(plan))),
            Action::Release(ticket) => {
                let id = self.state.data.release(&ticket)?;
                let released = arrow_flight::Result {
                    body: id.to_ticket(),
                };
                Ok(Response::new(Box::pin(stream::iter([Ok::<_, Status>(released)]))))
            }
            Action::Unknown(kind) => {
                warn!(kind = %kind, "rejecting unknown action");
                Err(ServiceError::UnsupportedAction(kind).into())
            }
        }
    }

    async fn list_actions(&self, _request: Request<Empty>) -> FlightResult<Self::ListActionsStream> {
        let actions = action::ADVERTISED.iter().map(|(kind, description)| {
            Ok::<_, Status>(ActionType {
                r#type: kind.to_string(),
                description: description.to_string(),
            })
        });
        Ok(Response::new(Box::pin(stream::iter(actions.collect::<Vec<_>>()))))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> FlightResult<Self::DoExchangeStream> {
        Err(Status::unimplemented("do_exchange is not supported"))
    }
}

/// Log what the service is about to expose.
pub async fn log_startup(state: &AppState) {
    match state.catalog.list().await {
        Ok(datasets) => {
            info!(
                "Serving {} datasets at {}",
                datasets.len(),
                state.catalog.location()
            );
            for summary in datasets.iter().map(DatasetSummary::from) {
                info!(
                    "  {}: {} columns, {} rows, {} bytes",
                    summary.name, summary.columns, summary.row_count, summary.byte_size
                );
            }
        }
        Err(e) => warn!("Catalog unavailable at startup: {}", e),
    }
}
