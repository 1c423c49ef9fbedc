use thiserror::Error;
use tonic::Status;

use flightdeck_catalog::CatalogError;
use flightdeck_storage::StorageError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid ticket: {0}")]
    InvalidTicket(String),

    #[error("Malformed ticket: {0}")]
    MalformedTicket(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("{0}")]
    Execution(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => Status::not_found(msg),
            ServiceError::InvalidTicket(msg) => Status::not_found(format!("invalid ticket: {msg}")),
            ServiceError::MalformedTicket(msg) => {
                Status::invalid_argument(format!("malformed ticket: {msg}"))
            }
            ServiceError::UnsupportedAction(kind) => {
                Status::unimplemented(format!("unsupported action '{kind}'"))
            }
            ServiceError::Execution(diagnostic) => Status::internal(diagnostic),
            ServiceError::Catalog(CatalogError::NotFound(name)) => {
                Status::not_found(format!("dataset not found: {name}"))
            }
            ServiceError::Storage(StorageError::NotFound(name)) => {
                Status::not_found(format!("dataset not found: {name}"))
            }
            other => Status::internal(other.to_string()),
        }
    }
}
