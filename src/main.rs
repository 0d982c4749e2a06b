use clap::Parser;
use gfw_analytics::utils::error::{AnalyticsError, ErrorSeverity};
use gfw_analytics::utils::{logger, validation::Validate};
use gfw_analytics::{
    AggregationResult, Aggregator, CartoDbClient, CliConfig, EarthEngineClient, Result,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting gfw-analytics CLI");
    if cli.verbose {
        tracing::debug!("CLI arguments: {:?}", cli);
    }

    match run(&cli).await {
        Ok(envelope) => {
            if envelope.is_empty() {
                tracing::warn!("⚠️ Backend returned no data for this request");
            }
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        Err(e) => {
            report(&e);
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            std::process::exit(exit_code);
        }
    }
}

async fn run(cli: &CliConfig) -> Result<AggregationResult> {
    let config = cli.load_config()?;
    config.validate()?;

    let tabular = CartoDbClient::new(&config.tabular)?;
    let raster = EarthEngineClient::new(&config.raster)?;
    let aggregator = Aggregator::new(&config, tabular, raster);

    aggregator.analyze(cli.analysis_params()).await
}

fn report(e: &AnalyticsError) {
    tracing::error!(
        "❌ Analysis failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
}
