use crate::domain::model::RasterAsset;
use crate::utils::error::{AnalyticsError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_required_field,
    validate_sql_identifier, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TABULAR_ENDPOINT: &str = "https://wri-01.cartodb.com/api/v2/sql";
pub const DEFAULT_RASTER_ENDPOINT: &str = "https://earthengine.googleapis.com/v1";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Process-wide, read-only configuration. Loaded once at startup and passed
/// into the backend clients and the aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub tabular: TabularConfig,
    #[serde(default)]
    pub tables: TablesConfig,
    #[serde(default)]
    pub raster: RasterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularConfig {
    #[serde(default = "default_tabular_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub api_key: Option<String>,
    /// 每次查詢都帶上 api_key
    #[serde(default)]
    pub send_api_key: bool,
}

impl TabularConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            endpoint: default_tabular_endpoint(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            api_key: None,
            send_api_key: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    pub forma: String,
    pub modis: String,
    pub imazon: String,
    pub hansen: String,
    /// Country borders, keyed by `iso`, with a `the_geom` column.
    pub countries: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            forma: "cdm_2013_11_08".to_string(),
            modis: "modis_forest_change_copy".to_string(),
            imazon: "imazon_sad".to_string(),
            hansen: "hansen".to_string(),
            countries: "world_countries".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterConfig {
    #[serde(default = "default_raster_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub token: Option<String>,
    #[serde(default)]
    pub assets: AssetTable,
}

impl RasterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            endpoint: default_raster_endpoint(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            token: None,
            assets: AssetTable::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetTable {
    pub hansen_all: Option<String>,
    pub hansen_loss: Option<String>,
}

impl AssetTable {
    /// 取得 raster engine 的 asset id
    pub fn asset_id(&self, asset: RasterAsset) -> Result<&str> {
        let field = format!("raster.assets.{}", asset.key());
        let id = match asset {
            RasterAsset::HansenAll => validate_required_field(&field, &self.hansen_all)?,
            RasterAsset::HansenLoss => validate_required_field(&field, &self.hansen_loss)?,
        };
        Ok(id.as_str())
    }
}

fn default_tabular_endpoint() -> String {
    DEFAULT_TABULAR_ENDPOINT.to_string()
}

fn default_raster_endpoint() -> String {
    DEFAULT_RASTER_ENDPOINT.to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl AnalyticsConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AnalyticsError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        let config: Self =
            toml::from_str(&processed_content).map_err(|e| AnalyticsError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        Ok(config.with_resolved_secrets())
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("GFW_TABULAR_ENDPOINT") {
            config.tabular.endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("GFW_RASTER_ENDPOINT") {
            config.raster.endpoint = endpoint;
        }
        config.tabular.api_key = std::env::var("CARTODB_API_KEY").ok();
        config.raster.token = std::env::var("EE_TOKEN").ok();
        config.raster.assets.hansen_all = std::env::var("GFW_ASSET_HANSEN_ALL").ok();
        config.raster.assets.hansen_loss = std::env::var("GFW_ASSET_HANSEN_LOSS").ok();
        config.with_resolved_secrets()
    }

    /// 替換環境變數 (例如 ${CARTODB_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AnalyticsError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Empty or unsubstituted `${VAR}` secrets count as not configured.
    fn with_resolved_secrets(mut self) -> Self {
        fn resolved(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty() && !v.starts_with("${"))
        }
        self.tabular.api_key = resolved(self.tabular.api_key);
        self.raster.token = resolved(self.raster.token);
        self.raster.assets.hansen_all = resolved(self.raster.assets.hansen_all);
        self.raster.assets.hansen_loss = resolved(self.raster.assets.hansen_loss);
        self
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_url("tabular.endpoint", &self.tabular.endpoint)?;
        validate_positive_number("tabular.timeout_seconds", self.tabular.timeout_seconds, 1)?;
        if self.tabular.send_api_key {
            validate_required_field("tabular.api_key", &self.tabular.api_key)?;
        }

        validate_sql_identifier("tables.forma", &self.tables.forma)?;
        validate_sql_identifier("tables.modis", &self.tables.modis)?;
        validate_sql_identifier("tables.imazon", &self.tables.imazon)?;
        validate_sql_identifier("tables.hansen", &self.tables.hansen)?;
        validate_sql_identifier("tables.countries", &self.tables.countries)?;

        validate_url("raster.endpoint", &self.raster.endpoint)?;
        validate_positive_number("raster.timeout_seconds", self.raster.timeout_seconds, 1)?;
        // 未設定的 asset 在 hansen polygon 查詢時才報錯
        let assets = &self.raster.assets;
        for (asset, id) in [
            (RasterAsset::HansenAll, &assets.hansen_all),
            (RasterAsset::HansenLoss, &assets.hansen_loss),
        ] {
            if let Some(id) = id {
                validate_non_empty_string(&format!("raster.assets.{}", asset.key()), id)?;
            }
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}

impl Validate for AnalyticsConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
