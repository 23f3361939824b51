use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::observability::LogFormat;
use crate::pipeline::PipelineLimits;
use crate::rules::{EvalLimits, DEFAULT_RULE_TIMEOUT};

/// Audit run configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "bookaudit")]
#[command(about = "Validate and reconcile two snapshots of an insurance policy book")]
pub struct Config {
    /// Path to audit settings YAML file
    #[arg(long, default_value = "audit.yaml", env = "BOOKAUDIT_SETTINGS")]
    pub settings: PathBuf,

    /// Current period snapshot (.csv or .tsv)
    #[arg(long, default_value = "current.csv", env = "BOOKAUDIT_CURRENT")]
    pub current: PathBuf,

    /// Previous period snapshot (.csv or .tsv)
    #[arg(long, default_value = "previous.csv", env = "BOOKAUDIT_PREVIOUS")]
    pub previous: PathBuf,

    /// Where to write the JSON result (stdout if not set)
    #[arg(long, env = "BOOKAUDIT_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "BOOKAUDIT_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Wall-clock budget per custom rule in milliseconds
    #[arg(long, default_value = "2000", env = "BOOKAUDIT_RULE_TIMEOUT_MS")]
    pub rule_timeout_ms: u64,

    /// Expression nodes a custom rule may visit per row
    #[arg(long, default_value = "10000", env = "BOOKAUDIT_RULE_MAX_STEPS")]
    pub rule_max_steps: u64,

    /// Rule suggestion timeout in seconds (defaults to the settings file value)
    #[arg(long, env = "BOOKAUDIT_SUGGEST_TIMEOUT_SECS")]
    pub suggest_timeout_secs: Option<u64>,

    /// Write Prometheus metrics to this file after the run
    #[arg(long, env = "BOOKAUDIT_METRICS_PATH")]
    pub metrics_path: Option<PathBuf>,
}

impl Config {
    /// Get custom rule budget as Duration.
    pub fn rule_timeout(&self) -> Duration {
        Duration::from_millis(self.rule_timeout_ms)
    }

    /// Get suggestion timeout as Duration, falling back to `default_secs`.
    pub fn suggest_timeout(&self, default_secs: u64) -> Duration {
        Duration::from_secs(self.suggest_timeout_secs.unwrap_or(default_secs))
    }

    /// Pipeline limits for this run.
    pub fn pipeline_limits(&self, default_suggest_secs: u64) -> PipelineLimits {
        PipelineLimits {
            rules: EvalLimits {
                timeout: self.rule_timeout(),
                max_steps: self.rule_max_steps,
            },
            suggest_timeout: self.suggest_timeout(default_suggest_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settings: PathBuf::from("audit.yaml"),
            current: PathBuf::from("current.csv"),
            previous: PathBuf::from("previous.csv"),
            output: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            rule_timeout_ms: DEFAULT_RULE_TIMEOUT.as_millis() as u64,
            rule_max_steps: crate::rules::custom::DEFAULT_STEP_BUDGET,
            suggest_timeout_secs: None,
            metrics_path: None,
        }
    }
}
