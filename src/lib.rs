pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{CartoDbClient, EarthEngineClient};
pub use config::AnalyticsConfig;
pub use core::router::Aggregator;
pub use domain::model::{
    AggregationRequest, AggregationResult, Dataset, DateRange, Layer, ReductionParams, Region,
};
pub use domain::request::AnalysisParams;
pub use utils::error::{AnalyticsError, Result};
