//! Aggregation statements for the tabular store.
//!
//! Statements are kept as a template id plus typed parameters. Values are only
//! turned into SQL text by [`SqlQuery::render`], which quotes and escapes each
//! parameter according to its type.

use crate::config::toml_config::TablesConfig;
use crate::domain::model::{Dataset, DateRange, Layer, Region, STORAGE_SRID};
use crate::utils::error::{AnalyticsError, Result};
use crate::utils::validation::is_plain_identifier;
use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

const ALERTS_BY_ISO: &str = "SELECT SUM(count) AS sum
FROM
  (SELECT COUNT(*) AS count, iso, date
   FROM {table}
   WHERE iso = {iso}
     AND date >= {begin}
     AND date <= {end}
   GROUP BY date, iso
   ORDER BY iso, date) AS alias";

const ALERTS_BY_GEOJSON: &str = "SELECT SUM(count) AS sum
FROM
  (SELECT COUNT(*) AS count, iso, date
   FROM {table}
   WHERE date >= {begin}
     AND date <= {end}
     AND ST_INTERSECTS(ST_SetSRID(ST_GeomFromGeoJSON({geojson}), {srid}), the_geom)
   GROUP BY date, iso
   ORDER BY iso, date) AS alias";

const IMAZON_BY_ISO: &str = "SELECT SUM(ST_Area(ST_Intersection(t.the_geom, r.the_geom)::geography)) / 10000 AS sum
FROM {table} t,
  (SELECT the_geom FROM {countries} WHERE iso = {iso}) r
WHERE t.data_type = 'defor'
  AND ST_Intersects(t.the_geom, r.the_geom)";

const IMAZON_BY_GEOJSON: &str = "SELECT SUM(ST_Area(ST_Intersection(t.the_geom, r.the_geom)::geography)) / 10000 AS sum
FROM {table} t,
  (SELECT ST_SetSRID(ST_GeomFromGeoJSON({geojson}), {srid}) AS the_geom) r
WHERE t.data_type = 'defor'
  AND ST_Intersects(t.the_geom, r.the_geom)";

const HANSEN_SUM: &str = "SELECT iso, avg(treecover_2000) treecover_2000,
       avg(treecover_2000_perc) treecover_2000_perc,
       avg(gain) gain, avg(gain_perc) gain_perc,
       sum(loss) loss,
       sum(loss_perc) loss_perc
FROM {table}
WHERE iso ilike {iso}
GROUP BY iso";

const HANSEN_BY_YEAR: &str = "SELECT iso, year, sum(loss) loss, sum(loss_perc) loss_perc
FROM {table}
WHERE iso ilike {iso}
GROUP BY iso, year
ORDER BY iso, year ASC";

/// Country used by Imazon when the caller supplies no region.
pub const IMAZON_DEFAULT_ISO: &str = "BRA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTemplate {
    AlertsByIso,
    AlertsByGeojson,
    ImazonByIso,
    ImazonByGeojson,
    HansenSum,
    HansenByYear,
}

impl QueryTemplate {
    pub fn text(&self) -> &'static str {
        match self {
            QueryTemplate::AlertsByIso => ALERTS_BY_ISO,
            QueryTemplate::AlertsByGeojson => ALERTS_BY_GEOJSON,
            QueryTemplate::ImazonByIso => IMAZON_BY_ISO,
            QueryTemplate::ImazonByGeojson => IMAZON_BY_GEOJSON,
            QueryTemplate::HansenSum => HANSEN_SUM,
            QueryTemplate::HansenByYear => HANSEN_BY_YEAR,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Identifier(String),
    Text(String),
    Date(NaiveDate),
    Integer(i64),
    Geometry(Value),
}

impl SqlParam {
    fn to_sql(&self) -> Result<String> {
        Ok(match self {
            SqlParam::Identifier(name) if is_plain_identifier(name) => name.clone(),
            SqlParam::Identifier(name) => format!("\"{}\"", name.replace('"', "\"\"")),
            SqlParam::Text(text) => quote_literal(text),
            SqlParam::Date(date) => format!("'{}'", date.format("%Y-%m-%d")),
            SqlParam::Integer(n) => n.to_string(),
            SqlParam::Geometry(geometry) => quote_literal(&serde_json::to_string(geometry)?),
        })
    }
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\0', "").replace('\'', "''"))
}

fn placeholder_regex() -> Result<&'static Regex> {
    static RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}"))
        .as_ref()
        .map_err(|e| AnalyticsError::QueryRender {
            message: format!("invalid placeholder pattern: {}", e),
        })
}

/// Hansen table layer: an explicit layer wins; otherwise the all-bands
/// dataset reads the summary and the loss dataset has no default.
pub fn hansen_layer(dataset: Dataset, layer: Option<Layer>) -> Result<Layer> {
    match (dataset, layer) {
        (_, Some(layer)) => Ok(layer),
        (Dataset::HansenAll, None) => Ok(Layer::Sum),
        (_, None) => Err(AnalyticsError::invalid_request(
            "hansen by iso requires layer 'sum' or 'all'",
        )),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    template: QueryTemplate,
    params: Vec<(&'static str, SqlParam)>,
}

impl SqlQuery {
    pub fn new(template: QueryTemplate) -> Self {
        Self {
            template,
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, name: &'static str, param: SqlParam) -> Self {
        self.params.retain(|(existing, _)| *existing != name);
        self.params.push((name, param));
        self
    }

    pub fn template(&self) -> QueryTemplate {
        self.template
    }

    pub fn param(&self, name: &str) -> Option<&SqlParam> {
        self.params
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, param)| param)
    }

    /// Substitutes every `{name}` placeholder with its escaped parameter.
    /// Substituted text is never scanned again.
    pub fn render(&self) -> Result<String> {
        let mut rendered = Vec::with_capacity(self.params.len());
        for (name, param) in &self.params {
            rendered.push((*name, param.to_sql()?));
        }

        let mut missing = Vec::new();
        let statement = placeholder_regex()?.replace_all(self.template.text(), |caps: &Captures| {
            let name = &caps[1];
            match rendered.iter().find(|(bound, _)| *bound == name) {
                Some((_, sql)) => sql.clone(),
                None => {
                    missing.push(name.to_string());
                    caps[0].to_string()
                }
            }
        });

        if !missing.is_empty() {
            return Err(AnalyticsError::QueryRender {
                message: format!(
                    "unbound parameters {:?} in template {:?}",
                    missing, self.template
                ),
            });
        }
        Ok(statement.into_owned())
    }
}

/// Builds aggregation queries against the configured tables.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    tables: TablesConfig,
}

impl QueryBuilder {
    pub fn new(tables: TablesConfig) -> Self {
        Self { tables }
    }

    /// Picks the template for a dataset/region/layer combination and binds it.
    pub fn build(
        &self,
        dataset: Dataset,
        region: &Region,
        date_range: Option<&DateRange>,
        layer: Option<Layer>,
    ) -> Result<SqlQuery> {
        match dataset {
            Dataset::Forma | Dataset::Modis => {
                let date_range = date_range.ok_or_else(|| {
                    AnalyticsError::invalid_request(format!("{} requires begin and end dates", dataset))
                })?;
                match region {
                    Region::Iso(_) => self.alerts_by_iso(dataset, region, date_range),
                    Region::Polygon(_) => self.alerts_by_geojson(dataset, region, date_range),
                }
            }
            Dataset::Imazon => self.imazon(region),
            Dataset::HansenAll | Dataset::HansenLoss => {
                self.hansen(region, hansen_layer(dataset, layer)?)
            }
        }
    }

    pub fn alerts_by_iso(
        &self,
        dataset: Dataset,
        region: &Region,
        date_range: &DateRange,
    ) -> Result<SqlQuery> {
        let iso = expect_iso(QueryTemplate::AlertsByIso, region)?;
        Ok(SqlQuery::new(QueryTemplate::AlertsByIso)
            .bind("table", self.alerts_table(dataset)?)
            .bind("iso", SqlParam::Text(iso))
            .bind("begin", SqlParam::Date(date_range.start))
            .bind("end", SqlParam::Date(date_range.end)))
    }

    pub fn alerts_by_geojson(
        &self,
        dataset: Dataset,
        region: &Region,
        date_range: &DateRange,
    ) -> Result<SqlQuery> {
        let geometry = expect_geometry(QueryTemplate::AlertsByGeojson, region)?;
        Ok(SqlQuery::new(QueryTemplate::AlertsByGeojson)
            .bind("table", self.alerts_table(dataset)?)
            .bind("begin", SqlParam::Date(date_range.start))
            .bind("end", SqlParam::Date(date_range.end))
            .bind("geojson", SqlParam::Geometry(geometry.clone()))
            .bind("srid", SqlParam::Integer(i64::from(STORAGE_SRID))))
    }

    pub fn imazon(&self, region: &Region) -> Result<SqlQuery> {
        let table = SqlParam::Identifier(self.tables.imazon.clone());
        match region {
            Region::Iso(_) => Ok(SqlQuery::new(QueryTemplate::ImazonByIso)
                .bind("table", table)
                .bind(
                    "countries",
                    SqlParam::Identifier(self.tables.countries.clone()),
                )
                .bind(
                    "iso",
                    SqlParam::Text(expect_iso(QueryTemplate::ImazonByIso, region)?),
                )),
            Region::Polygon(geometry) => Ok(SqlQuery::new(QueryTemplate::ImazonByGeojson)
                .bind("table", table)
                .bind("geojson", SqlParam::Geometry(geometry.clone()))
                .bind("srid", SqlParam::Integer(i64::from(STORAGE_SRID)))),
        }
    }

    pub fn hansen(&self, region: &Region, layer: Layer) -> Result<SqlQuery> {
        let template = match layer {
            Layer::Sum => QueryTemplate::HansenSum,
            Layer::All => QueryTemplate::HansenByYear,
        };
        let iso = expect_iso(template, region)?;
        Ok(SqlQuery::new(template)
            .bind("table", SqlParam::Identifier(self.tables.hansen.clone()))
            .bind("iso", SqlParam::Text(iso)))
    }

    fn alerts_table(&self, dataset: Dataset) -> Result<SqlParam> {
        let table = match dataset {
            Dataset::Forma => &self.tables.forma,
            Dataset::Modis => &self.tables.modis,
            other => {
                return Err(AnalyticsError::invalid_request(format!(
                    "{} is not an alerts dataset",
                    other
                )))
            }
        };
        Ok(SqlParam::Identifier(table.clone()))
    }
}

fn expect_iso(template: QueryTemplate, region: &Region) -> Result<String> {
    match region {
        Region::Iso(code) => Ok(code.trim().to_uppercase()),
        Region::Polygon(_) => Err(AnalyticsError::invalid_request(format!(
            "template {:?} requires an iso region, got a polygon",
            template
        ))),
    }
}

fn expect_geometry(template: QueryTemplate, region: &Region) -> Result<&Value> {
    match region {
        Region::Polygon(geometry) => Ok(geometry),
        Region::Iso(code) => Err(AnalyticsError::invalid_request(format!(
            "template {:?} requires a polygon region, got iso '{}'",
            template, code
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(TablesConfig::default())
    }

    fn range_2013() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2013, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2013, 12, 31).unwrap(),
        )
    }

    fn square() -> Value {
        json!({"type": "Polygon", "coordinates": [[[-60.0, -10.0], [-59.0, -10.0], [-59.0, -9.0], [-60.0, -10.0]]]})
    }

    #[test]
    fn test_alerts_by_iso_contains_code_and_dates() {
        let range = range_2013();
        for dataset in [Dataset::Forma, Dataset::Modis] {
            let sql = builder()
                .build(dataset, &Region::Iso("bra".to_string()), Some(&range), None)
                .unwrap()
                .render()
                .unwrap();

            assert!(sql.contains("iso = 'BRA'"));
            assert!(sql.contains("date >= '2013-01-01'"));
            assert!(sql.contains("date <= '2013-12-31'"));
            assert!(sql.contains("GROUP BY date, iso"));
            assert!(sql.contains("ORDER BY iso, date"));
        }
    }

    #[test]
    fn test_alerts_use_dataset_table() {
        let range = range_2013();
        let region = Region::Iso("IDN".to_string());
        let forma = builder()
            .build(Dataset::Forma, &region, Some(&range), None)
            .unwrap()
            .render()
            .unwrap();
        let modis = builder()
            .build(Dataset::Modis, &region, Some(&range), None)
            .unwrap()
            .render()
            .unwrap();

        assert!(forma.contains("FROM cdm_2013_11_08"));
        assert!(modis.contains("FROM modis_forest_change_copy"));
    }

    #[test]
    fn test_alerts_by_geojson_intersects_serialized_geometry() {
        let geometry = square();
        let query = builder()
            .build(
                Dataset::Forma,
                &Region::Polygon(geometry.clone()),
                Some(&range_2013()),
                None,
            )
            .unwrap();
        assert_eq!(query.template(), QueryTemplate::AlertsByGeojson);

        let sql = query.render().unwrap();
        let serialized = serde_json::to_string(&geometry).unwrap();
        assert!(sql.contains(&format!(
            "ST_INTERSECTS(ST_SetSRID(ST_GeomFromGeoJSON('{}'), 4326), the_geom)",
            serialized
        )));
        assert!(!sql.contains("iso ="));
    }

    #[test]
    fn test_wrong_region_variant_is_invalid_request() {
        let range = range_2013();
        let polygon = Region::Polygon(square());
        let iso = Region::Iso("BRA".to_string());

        let err = builder()
            .alerts_by_iso(Dataset::Forma, &polygon, &range)
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest { .. }));

        let err = builder()
            .alerts_by_geojson(Dataset::Modis, &iso, &range)
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest { .. }));

        let err = builder().hansen(&polygon, Layer::Sum).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest { .. }));
    }

    #[test]
    fn test_alerts_without_dates_is_invalid_request() {
        let err = builder()
            .build(Dataset::Forma, &Region::Iso("BRA".to_string()), None, None)
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest { .. }));
    }

    #[test]
    fn test_quotes_in_values_are_escaped() {
        let region = Region::Iso("x' OR '1'='1".to_string());
        let sql = builder()
            .hansen(&region, Layer::Sum)
            .unwrap()
            .render()
            .unwrap();
        assert!(sql.contains("iso ilike 'X'' OR ''1''=''1'"));

        let geometry = json!({"type": "Polygon", "name": "it's", "coordinates": []});
        let sql = builder()
            .imazon(&Region::Polygon(geometry))
            .unwrap()
            .render()
            .unwrap();
        assert!(sql.contains("\"name\":\"it''s\""));
    }

    #[test]
    fn test_placeholders_inside_values_are_not_expanded() {
        let geometry = json!({"type": "Polygon", "coordinates": [], "note": "{table}"});
        let sql = builder()
            .imazon(&Region::Polygon(geometry))
            .unwrap()
            .render()
            .unwrap();
        assert!(sql.contains("\"note\":\"{table}\""));
        assert!(sql.contains("FROM imazon_sad t"));
    }

    #[test]
    fn test_unusual_table_names_are_quoted() {
        let tables = TablesConfig {
            hansen: "Hansen Summary".to_string(),
            ..TablesConfig::default()
        };
        let sql = QueryBuilder::new(tables)
            .hansen(&Region::Iso("IDN".to_string()), Layer::All)
            .unwrap()
            .render()
            .unwrap();
        assert!(sql.contains("FROM \"Hansen Summary\""));
    }

    #[test]
    fn test_unbound_placeholder_fails_to_render() {
        let query = SqlQuery::new(QueryTemplate::HansenSum)
            .bind("table", SqlParam::Identifier("hansen".to_string()));
        let err = query.render().unwrap_err();
        assert!(matches!(err, AnalyticsError::QueryRender { .. }));
    }

    #[test]
    fn test_imazon_by_iso_clips_to_country() {
        let sql = builder()
            .build(
                Dataset::Imazon,
                &Region::Iso(IMAZON_DEFAULT_ISO.to_string()),
                None,
                None,
            )
            .unwrap()
            .render()
            .unwrap();
        assert!(sql.contains("FROM imazon_sad t"));
        assert!(sql.contains("(SELECT the_geom FROM world_countries WHERE iso = 'BRA') r"));
        assert!(sql.contains("t.data_type = 'defor'"));
    }

    #[test]
    fn test_hansen_templates_follow_layer() {
        let region = Region::Iso("idn".to_string());

        let sum = builder()
            .build(Dataset::HansenAll, &region, None, Some(Layer::Sum))
            .unwrap();
        assert_eq!(sum.template(), QueryTemplate::HansenSum);
        let sql = sum.render().unwrap();
        assert!(sql.contains("avg(treecover_2000_perc) treecover_2000_perc"));
        assert!(sql.contains("iso ilike 'IDN'"));
        assert!(sql.contains("GROUP BY iso"));

        let all = builder()
            .build(Dataset::HansenLoss, &region, None, Some(Layer::All))
            .unwrap();
        assert_eq!(all.template(), QueryTemplate::HansenByYear);
        assert!(all
            .render()
            .unwrap()
            .contains("ORDER BY iso, year ASC"));

        let err = builder()
            .build(Dataset::HansenLoss, &region, None, None)
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest { .. }));
    }

    #[test]
    fn test_explicit_hansen_layer_overrides_dataset_default() {
        let region = Region::Iso("IDN".to_string());

        let loss_sum = builder()
            .build(Dataset::HansenLoss, &region, None, Some(Layer::Sum))
            .unwrap();
        assert_eq!(loss_sum.template(), QueryTemplate::HansenSum);

        let all_by_year = builder()
            .build(Dataset::HansenAll, &region, None, Some(Layer::All))
            .unwrap();
        assert_eq!(all_by_year.template(), QueryTemplate::HansenByYear);

        let default_sum = builder()
            .build(Dataset::HansenAll, &region, None, None)
            .unwrap();
        assert_eq!(default_sum.template(), QueryTemplate::HansenSum);
    }

    #[test]
    fn test_bind_replaces_existing_parameter() {
        let query = SqlQuery::new(QueryTemplate::HansenSum)
            .bind("iso", SqlParam::Text("BRA".to_string()))
            .bind("iso", SqlParam::Text("IDN".to_string()));
        assert_eq!(
            query.param("iso"),
            Some(&SqlParam::Text("IDN".to_string()))
        );
    }
}
