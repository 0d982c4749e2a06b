//! Two-pass region reduction over a raster asset.
//!
//! The area pass turns 0-255 pixel values into absolute ground area, the
//! percent pass into a share of the region's total area. Both passes, and the
//! nested total-area reduction inside the percent pass, share one
//! [`ReduceArgs`] value so they are evaluated over exactly the same region.

use crate::config::toml_config::AssetTable;
use crate::domain::model::{
    BackendFailure, BandValues, RasterAsset, RawBackendResult, ReductionParams,
};
use crate::core::ports::RasterBackend;
use crate::utils::error::{AnalyticsError, Result};
use serde::Serialize;
use serde_json::{json, Value};

pub const DEFAULT_SCALE: u64 = 90;
pub const DEFAULT_BEST_EFFORT: bool = true;

/// Pixel values are 0-255 fractions of a pixel; area is reported in km².
pub const AREA_NORMALIZER: f64 = 1000.0 * 1000.0 * 255.0;
pub const PERCENT_FACTOR: f64 = 100.0 / 255.0;

const PIXEL_AREA_BAND: &str = "area";
const LOSS_BAND: &str = "loss";
const LOSS_SUM_BAND: &str = "loss_sum";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
}

/// Server-side image expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ImageExpr {
    Asset {
        id: String,
    },
    PixelArea,
    Constant {
        value: f64,
    },
    /// Constant image holding `band` of a nested region reduction.
    RegionConstant {
        band: String,
        reduction: Box<ReduceRegionRequest>,
    },
    Divide {
        left: Box<ImageExpr>,
        right: Box<ImageExpr>,
    },
    Multiply {
        left: Box<ImageExpr>,
        right: Box<ImageExpr>,
    },
}

impl ImageExpr {
    pub fn asset(id: impl Into<String>) -> Self {
        ImageExpr::Asset { id: id.into() }
    }

    pub fn constant(value: f64) -> Self {
        ImageExpr::Constant { value }
    }

    pub fn divide(self, right: ImageExpr) -> Self {
        ImageExpr::Divide {
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn multiply(self, right: ImageExpr) -> Self {
        ImageExpr::Multiply {
            left: Box::new(self),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceArgs {
    pub reducer: Reducer,
    pub geometry: Value,
    pub scale: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_scale: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pixels: Option<u64>,
    pub best_effort: bool,
}

impl ReduceArgs {
    /// Builds the reduction region from the geometry's `coordinates` and
    /// applies the knob defaults.
    pub fn from_geometry(geometry: &Value, params: &ReductionParams) -> Result<Self> {
        let coordinates = geometry
            .get("coordinates")
            .filter(|c| c.is_array())
            .ok_or_else(|| {
                AnalyticsError::invalid_request("geom must carry a 'coordinates' array")
            })?;

        Ok(Self {
            reducer: Reducer::Sum,
            geometry: json!({"type": "Polygon", "coordinates": coordinates}),
            scale: params.scale.unwrap_or(DEFAULT_SCALE),
            tile_scale: params.tile_scale,
            max_pixels: params.max_pixels,
            best_effort: params.best_effort.unwrap_or(DEFAULT_BEST_EFFORT),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReduceRegionRequest {
    pub image: ImageExpr,
    #[serde(flatten)]
    pub args: ReduceArgs,
}

/// `asset / (1000 * 1000 * 255) * pixelArea`
pub fn area_request(asset_id: &str, args: &ReduceArgs) -> ReduceRegionRequest {
    ReduceRegionRequest {
        image: ImageExpr::asset(asset_id)
            .divide(ImageExpr::constant(AREA_NORMALIZER))
            .multiply(ImageExpr::PixelArea),
        args: args.clone(),
    }
}

/// `asset * (100 / 255) / regionArea * pixelArea`, where `regionArea` is the
/// pixel area summed over the same region with the same arguments.
pub fn percent_request(asset_id: &str, args: &ReduceArgs) -> ReduceRegionRequest {
    let region_area = ImageExpr::RegionConstant {
        band: PIXEL_AREA_BAND.to_string(),
        reduction: Box::new(ReduceRegionRequest {
            image: ImageExpr::PixelArea,
            args: args.clone(),
        }),
    };
    ReduceRegionRequest {
        image: ImageExpr::asset(asset_id)
            .multiply(ImageExpr::constant(PERCENT_FACTOR))
            .divide(region_area)
            .multiply(ImageExpr::PixelArea),
        args: args.clone(),
    }
}

/// Keeps `loss` free for the per-year layer: the all-bands asset reports its
/// total loss as `loss_sum`.
fn rename_loss_band(bands: &mut BandValues) {
    if let Some(loss) = bands.remove(LOSS_BAND) {
        bands.insert(LOSS_SUM_BAND.to_string(), loss);
    }
}

pub struct RasterReducer<R: RasterBackend> {
    backend: R,
    assets: AssetTable,
}

impl<R: RasterBackend> RasterReducer<R> {
    pub fn new(backend: R, assets: AssetTable) -> Self {
        Self { backend, assets }
    }

    /// Runs the area and percent passes concurrently.
    ///
    /// Errors are limited to bad input (no coordinates) and missing asset
    /// configuration; backend problems come back as
    /// [`RawBackendResult::BackendFailure`].
    pub async fn reduce(
        &self,
        asset: RasterAsset,
        geometry: &Value,
        params: &ReductionParams,
    ) -> Result<RawBackendResult> {
        let args = ReduceArgs::from_geometry(geometry, params)?;
        let asset_id = self.assets.asset_id(asset)?;

        let area = area_request(asset_id, &args);
        let percent = percent_request(asset_id, &args);

        tracing::info!(
            "🛰️ Reducing {} ({}) at scale {}",
            asset.key(),
            asset_id,
            args.scale
        );
        let joined = tokio::try_join!(
            self.backend.reduce_region(&area),
            self.backend.reduce_region(&percent)
        );

        match joined {
            Ok((mut area, mut percent)) => {
                if asset == RasterAsset::HansenAll {
                    rename_loss_band(&mut area);
                    rename_loss_band(&mut percent);
                }
                Ok(RawBackendResult::RasterBands { area, percent })
            }
            Err(e) => {
                tracing::error!("❌ Raster reduction of {} failed: {}", asset_id, e);
                Ok(RawBackendResult::BackendFailure(BackendFailure::from_error(
                    &e,
                )))
            }
        }
    }
}
