use crate::domain::model::{AggregationRequest, Dataset, DateRange, Layer, ReductionParams, Region};
use crate::utils::error::{AnalyticsError, Result};
use crate::utils::validation::validate_range;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Raw analysis parameters as they arrive from a query string or the CLI.
///
/// Every field is kept as text; [`AggregationRequest::try_from`] does the
/// decoding so that malformed input fails before any backend is touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub dataset: String,
    pub iso: Option<String>,
    pub geom: Option<String>,
    pub begin: Option<String>,
    pub end: Option<String>,
    pub layer: Option<String>,
    pub scale: Option<String>,
    #[serde(rename = "tileScale")]
    pub tile_scale: Option<String>,
    #[serde(rename = "maxPixels")]
    pub max_pixels: Option<String>,
    #[serde(rename = "bestEffort")]
    pub best_effort: Option<String>,
}

impl TryFrom<AnalysisParams> for AggregationRequest {
    type Error = AnalyticsError;

    fn try_from(params: AnalysisParams) -> Result<Self> {
        let layer = non_empty(&params.layer).map(Layer::parse).transpose()?;
        let dataset = Dataset::from_id(&params.dataset, layer)?;

        // geom 優先於 iso
        let region = match (non_empty(&params.geom), non_empty(&params.iso)) {
            (Some(geom), _) => Some(Region::from_geojson(geom)?),
            (None, Some(iso)) => Some(parse_iso(iso)?),
            (None, None) => None,
        };

        let date_range = match (non_empty(&params.begin), non_empty(&params.end)) {
            (Some(begin), Some(end)) => Some(DateRange::new(
                parse_date("begin", begin)?,
                parse_date("end", end)?,
            )),
            (None, None) => None,
            _ => {
                return Err(AnalyticsError::invalid_request(
                    "begin and end must be supplied together",
                ))
            }
        };

        let reduction_params = ReductionParams {
            scale: parse_integer("scale", &params.scale)?,
            tile_scale: parse_integer("tileScale", &params.tile_scale)?,
            max_pixels: parse_integer("maxPixels", &params.max_pixels)?,
            best_effort: parse_flag("bestEffort", &params.best_effort)?,
        };

        Ok(AggregationRequest {
            dataset,
            region,
            date_range,
            layer,
            reduction_params,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_iso(raw: &str) -> Result<Region> {
    if raw.len() != 3 || !raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AnalyticsError::invalid_request(format!(
            "iso must be a 3-letter country code, got '{}'",
            raw
        )));
    }
    Ok(Region::Iso(raw.to_string()))
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        AnalyticsError::invalid_request(format!("{} must be yyyy-mm-dd, got '{}': {}", field, raw, e))
    })?;
    validate_range(field, date.year(), 1900, 2099)
        .map_err(|e| AnalyticsError::invalid_request(e.to_string()))?;
    Ok(date)
}

/// Integer knobs accept plain integers and whole-valued decimals (`"1e9"`).
fn parse_integer(field: &str, raw: &Option<String>) -> Result<Option<u64>> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    if let Ok(n) = raw.parse::<u64>() {
        return Ok(Some(n));
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as u64)),
        _ => Err(AnalyticsError::invalid_request(format!(
            "{} must be a non-negative integer, got '{}'",
            field, raw
        ))),
    }
}

fn parse_flag(field: &str, raw: &Option<String>) -> Result<Option<bool>> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        _ => Err(AnalyticsError::invalid_request(format!(
            "{} must be true or false, got '{}'",
            field, raw
        ))),
    }
}
