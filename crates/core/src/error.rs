use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlightdeckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Malformed query id: {0}")]
    MalformedQueryId(String),

    #[error("Schema mismatch in batch {index}: expected {expected}, got {actual}")]
    SchemaMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("{0}")]
    Other(String),
}
