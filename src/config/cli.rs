use crate::config::toml_config::AnalyticsConfig;
use crate::domain::request::AnalysisParams;
use crate::utils::error::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "gfw-analytics")]
#[command(about = "Forest change analytics by country or polygon")]
pub struct CliConfig {
    #[arg(long, help = "TOML configuration file (defaults to environment variables)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Dataset: forma, modis, imazon or hansen")]
    pub dataset: String,

    #[arg(long, help = "3-letter country code")]
    pub iso: Option<String>,

    #[arg(long, help = "GeoJSON geometry (SRID 4326)")]
    pub geom: Option<String>,

    #[arg(long, help = "Start date, yyyy-mm-dd")]
    pub begin: Option<String>,

    #[arg(long, help = "End date, yyyy-mm-dd")]
    pub end: Option<String>,

    #[arg(long, help = "Hansen layer: sum or all")]
    pub layer: Option<String>,

    #[arg(long)]
    pub scale: Option<String>,

    #[arg(long)]
    pub tile_scale: Option<String>,

    #[arg(long)]
    pub max_pixels: Option<String>,

    #[arg(long)]
    pub best_effort: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

impl CliConfig {
    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams {
            dataset: self.dataset.clone(),
            iso: self.iso.clone(),
            geom: self.geom.clone(),
            begin: self.begin.clone(),
            end: self.end.clone(),
            layer: self.layer.clone(),
            scale: self.scale.clone(),
            tile_scale: self.tile_scale.clone(),
            max_pixels: self.max_pixels.clone(),
            best_effort: self.best_effort.clone(),
        }
    }

    /// 有指定設定檔就讀檔，否則從環境變數組出配置
    pub fn load_config(&self) -> Result<AnalyticsConfig> {
        match &self.config {
            Some(path) => AnalyticsConfig::from_file(path),
            None => Ok(AnalyticsConfig::from_env()),
        }
    }
}
