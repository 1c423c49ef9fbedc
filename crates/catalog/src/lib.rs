pub mod catalog;
pub mod error;

pub use catalog::{DatasetCatalog, DatasetDescriptor, DatasetSummary, Locator};
pub use error::CatalogError;
