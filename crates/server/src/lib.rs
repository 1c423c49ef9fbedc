pub mod action;
pub mod cache;
pub mod channel;
pub mod error;
pub mod flight;
pub mod query;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

pub use action::Action;
pub use cache::{CacheStats, PutOutcome, ReleaseOutcome, ResultCache};
pub use channel::{DataChannel, ResultStream};
pub use error::ServiceError;
pub use flight::FlightdeckService;
pub use query::{ControlMessage, ControlStream, Progress, QueryOptions, QueryService, QueryState};
pub use state::AppState;

/// Serve the Flight service on an already-bound listener until `shutdown`
/// resolves.
pub async fn serve(
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> Result<(), tonic::transport::Error> {
    Server::builder()
        .add_service(FlightdeckService::new(state).into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}
