use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Unknown dataset name.
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// The backend could not run a plan. The diagnostic is surfaced verbatim.
    #[error("execution error: {0}")]
    Execution(String),

    #[error("dataset already exists: {0}")]
    AlreadyExists(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("datafusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] flightdeck_core::FlightdeckError),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}
