use anyhow::{Context, Result};
use survey_scan::batch::BatchProcessor;
use survey_scan::config::ScanConfig;
use survey_scan::observability;
use survey_scan::observability_config::ObservabilityConfig;
use tracing::info;

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let observability_config = ObservabilityConfig::from_env();
    observability_config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;
    observability::init_tracing(&observability_config)?;

    let config = ScanConfig::from_env().context("Failed to load scan configuration")?;
    config
        .validate()
        .context("Scan configuration validation failed")?;
    info!("{}", config.summary());

    let processor = BatchProcessor::new(&config).with_context(|| {
        format!(
            "Cannot process input directory {}",
            config.input_dir.display()
        )
    })?;
    let report = processor.process_directory()?;

    let stats = processor.processing_stats()?;
    info!(
        total_processed = stats.total_processed,
        total_files = stats.total_files,
        "Output directory statistics"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
