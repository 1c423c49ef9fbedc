pub mod config;
pub mod dataset;
pub mod error;
pub mod plan;

pub use config::Config;
pub use dataset::{Dataset, ResultSet};
pub use error::*;
pub use plan::{Plan, PlanHasher, QueryId, QUERY_ID_LEN};
