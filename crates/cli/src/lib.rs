pub mod client;

pub use client::{ClientError, DatasetInfo, FetchedResult, QueryClient, Submission};
