pub mod config;
pub mod domain;
pub mod loader;
pub mod observability;
pub mod outlier;
pub mod pipeline;
pub mod reconcile;
pub mod rules;
pub mod settings;
pub mod suggest;

pub use config::Config;
pub use domain::{AuditSettings, Dataset, RowKey, Severity, Value};
pub use outlier::OutlierDetector;
pub use pipeline::{AuditError, AuditPipeline, AuditResult, PipelineLimits};
pub use reconcile::Reconciler;
pub use rules::{RuleEngine, RuleSet};
