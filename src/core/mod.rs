pub mod ports;
pub mod query;
pub mod reduction;
pub mod router;

pub use crate::core::ports::{ExecuteOptions, RasterBackend, TabularBackend};
pub use crate::domain::model::{AggregationRequest, AggregationResult, RawBackendResult};
pub use crate::utils::error::Result;
