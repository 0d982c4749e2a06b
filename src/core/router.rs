use crate::config::toml_config::AnalyticsConfig;
use crate::core::query::{hansen_layer, QueryBuilder, IMAZON_DEFAULT_ISO};
use crate::core::reduction::RasterReducer;
use crate::domain::model::{
    AggregationRequest, AggregationResult, BreakdownResult, Dataset, Layer, RasterAsset,
    RawBackendResult, Region, Row, ScalarResult,
};
use crate::core::ports::{ExecuteOptions, RasterBackend, TabularBackend};
use crate::domain::request::AnalysisParams;
use crate::utils::error::{AnalyticsError, Result};
use crate::utils::format::display_value;
use serde_json::{Map, Number, Value};

const ALERT_UNITS: &str = "alerts";
const AREA_UNITS: &str = "ha";
const SUM_COLUMN: &str = "sum";

/// Routes each dataset to its backend and normalizes the answer.
///
/// Only request errors are returned as `Err`; backend failures come back as
/// an envelope without a value.
pub struct Aggregator<T: TabularBackend, R: RasterBackend> {
    queries: QueryBuilder,
    tabular: T,
    raster: RasterReducer<R>,
    execute_options: ExecuteOptions,
}

impl<T: TabularBackend, R: RasterBackend> Aggregator<T, R> {
    pub fn new(config: &AnalyticsConfig, tabular: T, raster: R) -> Self {
        Self {
            queries: QueryBuilder::new(config.tables.clone()),
            tabular,
            raster: RasterReducer::new(raster, config.raster.assets.clone()),
            execute_options: ExecuteOptions {
                with_api_key: config.tabular.send_api_key,
            },
        }
    }

    /// Decodes raw parameters, then aggregates. Malformed input is rejected
    /// before any backend call.
    pub async fn analyze(&self, params: AnalysisParams) -> Result<AggregationResult> {
        let request = AggregationRequest::try_from(params)?;
        self.aggregate(&request).await
    }

    pub async fn aggregate(&self, request: &AggregationRequest) -> Result<AggregationResult> {
        tracing::debug!("Aggregating {:?}", request);
        match request.dataset {
            Dataset::Forma | Dataset::Modis => self.alerts(request).await,
            Dataset::Imazon => self.imazon(request).await,
            Dataset::HansenAll | Dataset::HansenLoss => self.hansen(request).await,
        }
    }

    async fn alerts(&self, request: &AggregationRequest) -> Result<AggregationResult> {
        let region = request.region.as_ref().ok_or_else(|| {
            AnalyticsError::invalid_request(format!("{} requires iso or geom", request.dataset))
        })?;
        let query = self.queries.build(
            request.dataset,
            region,
            request.date_range.as_ref(),
            request.layer,
        )?;
        tracing::info!("📊 {} by {}", request.dataset, region.kind());

        let raw = self.tabular.execute(&query, self.execute_options).await;
        Ok(scalar_envelope(ALERT_UNITS, &raw))
    }

    async fn imazon(&self, request: &AggregationRequest) -> Result<AggregationResult> {
        let default_region = Region::Iso(IMAZON_DEFAULT_ISO.to_string());
        let region = request.region.as_ref().unwrap_or(&default_region);
        let query = self
            .queries
            .build(Dataset::Imazon, region, None, request.layer)?;
        tracing::info!("📊 imazon by {}", region.kind());

        let raw = self.tabular.execute(&query, self.execute_options).await;
        Ok(scalar_envelope(AREA_UNITS, &raw))
    }

    async fn hansen(&self, request: &AggregationRequest) -> Result<AggregationResult> {
        match &request.region {
            Some(Region::Polygon(geometry)) => {
                let asset = match request.dataset {
                    Dataset::HansenAll => RasterAsset::HansenAll,
                    _ => RasterAsset::HansenLoss,
                };
                tracing::info!("📊 hansen by polygon on {}", asset.key());

                let raw = self
                    .raster
                    .reduce(asset, geometry, &request.reduction_params)
                    .await?;
                let mut breakdown = match raw {
                    RawBackendResult::RasterBands { area, percent } => BreakdownResult {
                        iso: None,
                        area: Some(area),
                        percent: Some(percent),
                        geom: None,
                    },
                    other => empty_breakdown(None, &other),
                };
                breakdown.geom = Some(geometry.clone());
                Ok(AggregationResult::Breakdown(breakdown))
            }
            Some(region @ Region::Iso(code)) => {
                let layer = hansen_layer(request.dataset, request.layer)?;
                let query = self
                    .queries
                    .build(request.dataset, region, None, Some(layer))?;
                tracing::info!("📊 hansen by iso ({:?})", layer);

                let iso = code.trim().to_uppercase();
                let raw = self.tabular.execute(&query, self.execute_options).await;
                let breakdown = match (&raw, layer) {
                    (RawBackendResult::TabularRows(rows), Layer::Sum) => {
                        hansen_summary(&iso, rows).unwrap_or_else(|| empty_breakdown(Some(iso), &raw))
                    }
                    (RawBackendResult::TabularRows(rows), Layer::All) => hansen_by_year(iso, rows),
                    _ => empty_breakdown(Some(iso), &raw),
                };
                Ok(AggregationResult::Breakdown(breakdown))
            }
            None => Err(AnalyticsError::invalid_request(
                "hansen requires either geom or iso",
            )),
        }
    }
}

/// First row's `sum` column, wrapped with its display string.
fn scalar_envelope(units: &str, raw: &RawBackendResult) -> AggregationResult {
    let value = match raw {
        RawBackendResult::TabularRows(rows) => {
            let value = rows
                .first()
                .and_then(|row| row.get(SUM_COLUMN))
                .and_then(as_number);
            if value.is_none() {
                tracing::warn!("⚠️ No '{}' value in {} row(s)", SUM_COLUMN, rows.len());
            }
            value
        }
        RawBackendResult::RasterBands { .. } => {
            tracing::warn!("⚠️ Raster bands where rows were expected");
            None
        }
        RawBackendResult::BackendFailure(_) => None,
    };

    AggregationResult::Scalar(ScalarResult {
        units: units.to_string(),
        value_display: value.as_ref().map(display_value).unwrap_or_default(),
        value,
    })
}

/// Numbers pass through; numeric strings (numeric columns in some SQL API
/// versions) are parsed.
fn as_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => s
            .parse::<i64>()
            .map(Number::from)
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64)),
        _ => None,
    }
}

fn empty_breakdown(iso: Option<String>, raw: &RawBackendResult) -> BreakdownResult {
    if let RawBackendResult::BackendFailure(failure) = raw {
        tracing::warn!("⚠️ No data computed: {}", failure.reason);
    }
    BreakdownResult {
        iso,
        area: None,
        percent: None,
        geom: None,
    }
}

fn column(row: &Row, name: &str) -> Value {
    row.get(name).cloned().unwrap_or(Value::Null)
}

fn hansen_summary(iso: &str, rows: &[Row]) -> Option<BreakdownResult> {
    let row = rows.first()?;

    let mut area = Map::new();
    area.insert("loss_sum".to_string(), column(row, "loss"));
    area.insert("treecover_2000".to_string(), column(row, "treecover_2000"));
    area.insert("gain".to_string(), column(row, "gain"));

    let mut percent = Map::new();
    percent.insert("loss_sum".to_string(), column(row, "loss_perc"));
    percent.insert(
        "treecover_2000".to_string(),
        column(row, "treecover_2000_perc"),
    );
    percent.insert("gain".to_string(), column(row, "gain_perc"));

    Some(BreakdownResult {
        iso: Some(iso.to_string()),
        area: Some(area),
        percent: Some(percent),
        geom: None,
    })
}

fn hansen_by_year(iso: String, rows: &[Row]) -> BreakdownResult {
    let mut area = Map::new();
    let mut percent = Map::new();
    for row in rows {
        let year = match row.get("year") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => {
                tracing::warn!("⚠️ Skipping hansen row without year: {:?}", row);
                continue;
            }
        };
        area.insert(year.clone(), column(row, "loss"));
        percent.insert(year, column(row, "loss_perc"));
    }

    BreakdownResult {
        iso: Some(iso),
        area: Some(area),
        percent: Some(percent),
        geom: None,
    }
}
