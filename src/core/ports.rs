use crate::core::query::SqlQuery;
use crate::core::reduction::ReduceRegionRequest;
use crate::domain::model::{BandValues, RawBackendResult};
use crate::utils::error::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Append the configured API key to the request.
    pub with_api_key: bool,
}

/// Remote SQL endpoint. Implementations never fail past this boundary:
/// transport problems come back as [`RawBackendResult::BackendFailure`].
#[async_trait]
pub trait TabularBackend: Send + Sync {
    async fn execute(&self, query: &SqlQuery, options: ExecuteOptions) -> RawBackendResult;
}

/// Remote raster engine evaluating one region reduction per call.
#[async_trait]
pub trait RasterBackend: Send + Sync {
    async fn reduce_region(&self, request: &ReduceRegionRequest) -> Result<BandValues>;
}
