use crate::utils::error::{AnalyticsError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// SRID of every geometry column in the tabular store and of caller geometries.
pub const STORAGE_SRID: u32 = 4326;

pub type Row = Map<String, Value>;
pub type BandValues = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    Iso(String),
    /// GeoJSON geometry object, always in [`STORAGE_SRID`].
    Polygon(Value),
}

impl Region {
    /// Decodes a GeoJSON geometry string. Decode failures are request errors.
    pub fn from_geojson(raw: &str) -> Result<Self> {
        let geometry: Value = serde_json::from_str(raw).map_err(|e| {
            AnalyticsError::invalid_request(format!("geom is not valid GeoJSON: {}", e))
        })?;
        if !geometry.is_object() {
            return Err(AnalyticsError::invalid_request(
                "geom must be a GeoJSON geometry object",
            ));
        }
        Ok(Region::Polygon(geometry))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Region::Iso(_) => "iso",
            Region::Polygon(_) => "polygon",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Forma,
    Modis,
    Imazon,
    /// Hansen summary layer (`layer=sum`).
    HansenAll,
    /// Hansen loss-by-year layer.
    HansenLoss,
}

impl Dataset {
    /// Resolves a public dataset id. `hansen` splits on the requested layer.
    pub fn from_id(id: &str, layer: Option<Layer>) -> Result<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "forma" => Ok(Dataset::Forma),
            "modis" => Ok(Dataset::Modis),
            "imazon" => Ok(Dataset::Imazon),
            "hansen" => match layer {
                Some(Layer::Sum) => Ok(Dataset::HansenAll),
                _ => Ok(Dataset::HansenLoss),
            },
            other => Err(AnalyticsError::invalid_request(format!(
                "unknown dataset '{}', expected one of forma, modis, imazon, hansen",
                other
            ))),
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Dataset::Forma => "forma",
            Dataset::Modis => "modis",
            Dataset::Imazon => "imazon",
            Dataset::HansenAll | Dataset::HansenLoss => "hansen",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Sum,
    All,
}

impl Layer {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Layer::Sum),
            "all" => Ok(Layer::All),
            other => Err(AnalyticsError::invalid_request(format!(
                "unknown layer '{}', expected 'sum' or 'all'",
                other
            ))),
        }
    }
}

/// Logical raster assets; engine asset ids come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterAsset {
    /// Multi-band Hansen image (loss, treecover_2000, gain).
    HansenAll,
    HansenLoss,
}

impl RasterAsset {
    pub fn key(&self) -> &'static str {
        match self {
            RasterAsset::HansenAll => "hansen_all",
            RasterAsset::HansenLoss => "hansen_loss",
        }
    }
}

/// Region-reduction knobs forwarded to the raster engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReductionParams {
    pub scale: Option<u64>,
    pub tile_scale: Option<u64>,
    pub max_pixels: Option<u64>,
    pub best_effort: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub dataset: Dataset,
    pub region: Option<Region>,
    pub date_range: Option<DateRange>,
    pub layer: Option<Layer>,
    pub reduction_params: ReductionParams,
}

impl AggregationRequest {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            region: None,
            date_range: None,
            layer: None,
            reduction_params: ReductionParams::default(),
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = Some(date_range);
        self
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = Some(layer);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport error, timeout or non-200 status.
    Unavailable,
    /// 200 status with a body that does not have the expected shape.
    Malformed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl BackendFailure {
    pub fn from_error(error: &AnalyticsError) -> Self {
        let kind = match error {
            AnalyticsError::MalformedBackendResponse { .. } | AnalyticsError::SerializationError(_) => {
                FailureKind::Malformed
            }
            _ => FailureKind::Unavailable,
        };
        Self {
            kind,
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawBackendResult {
    TabularRows(Vec<Row>),
    RasterBands { area: BandValues, percent: BandValues },
    BackendFailure(BackendFailure),
}

impl RawBackendResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, RawBackendResult::BackendFailure(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarResult {
    pub units: String,
    pub value: Option<Number>,
    pub value_display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,
    pub area: Option<Map<String, Value>>,
    pub percent: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geom: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationResult {
    Scalar(ScalarResult),
    Breakdown(BreakdownResult),
}

impl AggregationResult {
    /// True when the backend produced nothing usable for this call.
    pub fn is_empty(&self) -> bool {
        match self {
            AggregationResult::Scalar(scalar) => scalar.value.is_none(),
            AggregationResult::Breakdown(breakdown) => {
                breakdown.area.is_none() && breakdown.percent.is_none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_region_from_geojson() {
        let region =
            Region::from_geojson(r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}"#)
                .unwrap();
        assert_eq!(region.kind(), "polygon");
        match region {
            Region::Polygon(geometry) => assert_eq!(geometry["type"], "Polygon"),
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_region_from_malformed_geojson_is_invalid_request() {
        let err = Region::from_geojson(r#"{"type":"Polygon","coordinates":"#).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest { .. }));

        let err = Region::from_geojson("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest { .. }));
    }

    #[test]
    fn test_dataset_from_id() {
        assert_eq!(Dataset::from_id("FORMA", None).unwrap(), Dataset::Forma);
        assert_eq!(Dataset::from_id("modis", None).unwrap(), Dataset::Modis);
        assert_eq!(Dataset::from_id("imazon", None).unwrap(), Dataset::Imazon);
        assert_eq!(
            Dataset::from_id("hansen", Some(Layer::Sum)).unwrap(),
            Dataset::HansenAll
        );
        assert_eq!(
            Dataset::from_id("hansen", Some(Layer::All)).unwrap(),
            Dataset::HansenLoss
        );
        assert_eq!(Dataset::from_id("hansen", None).unwrap(), Dataset::HansenLoss);
        assert!(Dataset::from_id("umd", None).is_err());
    }

    #[test]
    fn test_layer_parse() {
        assert_eq!(Layer::parse("sum").unwrap(), Layer::Sum);
        assert_eq!(Layer::parse(" ALL ").unwrap(), Layer::All);
        assert!(Layer::parse("loss").is_err());
    }

    #[test]
    fn test_scalar_result_serialization() {
        let result = AggregationResult::Scalar(ScalarResult {
            units: "alerts".to_string(),
            value: Some(Number::from(1234)),
            value_display: "1,234".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"units": "alerts", "value": 1234, "value_display": "1,234"})
        );
    }

    #[test]
    fn test_breakdown_without_iso_omits_key() {
        let result = AggregationResult::Breakdown(BreakdownResult {
            iso: None,
            area: None,
            percent: None,
            geom: None,
        });
        assert!(result.is_empty());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"area": null, "percent": null})
        );
    }
}
