use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use bookaudit::config::Config;
use bookaudit::loader::{ensure_matching_columns, load_dataset};
use bookaudit::observability::{init_tracing, MetricsRegistry};
use bookaudit::pipeline::AuditPipeline;
use bookaudit::settings::load_settings;
use bookaudit::suggest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting bookaudit");

    let settings = load_settings(&config.settings)
        .with_context(|| format!("loading settings from {}", config.settings.display()))?;

    let current = load_dataset(&config.current, &settings)
        .with_context(|| format!("loading {}", config.current.display()))?;
    let previous = load_dataset(&config.previous, &settings)
        .with_context(|| format!("loading {}", config.previous.display()))?;
    ensure_matching_columns(&current, &previous)?;

    let suggester = suggest::from_settings(&settings.llm_validator)?;
    info!(suggester = suggester.name(), "Rule suggestion backend selected");

    let limits = config.pipeline_limits(settings.llm_validator.timeout_secs);
    let metrics = Arc::new(MetricsRegistry::new());
    let pipeline = AuditPipeline::new(settings, suggester, limits).with_metrics(metrics.clone());

    let result = match pipeline.run(Arc::new(current), Arc::new(previous)).await {
        Ok(result) => result,
        Err(e) => {
            // Validation and outlier results survive a failed reconciliation
            if let Some(partial) = e.partial() {
                write_report(config.output.as_deref(), partial)?;
            }
            return Err(e.into());
        }
    };

    write_report(config.output.as_deref(), &result)?;

    let comparison = &result.comparison_summary;
    info!(
        errors = result.validation_summary.total_errors(),
        warnings = result.validation_summary.total_warnings(),
        outlier_columns = result.outlier_summary.columns.len(),
        new = comparison.new_count().unwrap_or_default(),
        lapsed = comparison.lapsed_count().unwrap_or_default(),
        retained = comparison.retained_count(),
        retention_percent = comparison.retention_percent(),
        "Audit summary"
    );

    if let Some(path) = &config.metrics_path {
        fs::write(path, metrics.to_prometheus())
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }

    Ok(())
}

fn write_report<T: Serialize>(output: Option<&Path>, report: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Audit result written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
