//! End-to-end audit of two snapshots.
//!
//! Order is fixed: validate current, validate previous, detect outliers on
//! current, reconcile. Snapshots are only read, so aborting a run at any
//! point leaves nothing half-applied.

mod result;

pub use result::{AuditResult, OutlierOverview, PartialAudit, ValidationSummary};

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    AuditSettings, Dataset, RuleOrigin, Severity, ValidationFinding, ValidationReport,
};
use crate::observability::{MetricsRegistry, TimingGuard};
use crate::outlier::OutlierDetector;
use crate::reconcile::{ReconcileError, Reconciler, Snapshot};
use crate::rules::{EvalLimits, RuleEngine, RuleError, RuleSet};
use crate::settings::SettingsError;
use crate::suggest::{RuleSuggester, SchemaSample, SuggestError};

/// Rule name used for findings about the suggestion step itself.
pub const SUGGESTION_RULE: &str = "rule_suggestion";

/// Fatal errors that stop an audit run.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: {0}")]
    Rules(#[from] RuleError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Reconciliation stopped; the stages before it completed.
    #[error("Reconciliation failed: {source}")]
    Reconcile {
        #[source]
        source: ReconcileError,
        partial: Box<PartialAudit>,
    },

    #[error("Audit task failed: {0}")]
    Task(#[from] JoinError),
}

impl AuditError {
    /// Validation and outlier results computed before the failure, if any.
    pub fn partial(&self) -> Option<&PartialAudit> {
        match self {
            AuditError::Reconcile { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }
}

/// Time budgets for the parts of a run with external latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineLimits {
    pub rules: EvalLimits,
    pub suggest_timeout: Duration,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        PipelineLimits {
            rules: EvalLimits::default(),
            suggest_timeout: Duration::from_secs(30),
        }
    }
}

/// Orchestrates validation, outlier detection and reconciliation.
pub struct AuditPipeline {
    settings: AuditSettings,
    suggester: Arc<dyn RuleSuggester>,
    limits: PipelineLimits,
    metrics: Arc<MetricsRegistry>,
}

impl AuditPipeline {
    /// Create a new pipeline.
    pub fn new(
        settings: AuditSettings,
        suggester: Arc<dyn RuleSuggester>,
        limits: PipelineLimits,
    ) -> Self {
        AuditPipeline {
            settings,
            suggester,
            limits,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Share a metrics registry with the caller.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    /// Audit the current snapshot against the previous one.
    ///
    /// Validation, outlier detection and reconciliation run on the blocking
    /// pool, so the calling runtime keeps serving other tasks meanwhile.
    pub async fn run(
        &self,
        current: Arc<Dataset>,
        previous: Arc<Dataset>,
    ) -> Result<AuditResult, AuditError> {
        let _timer = TimingGuard::new(&self.metrics);
        let started = Instant::now();

        let result = self.execute(current, previous).await;
        self.metrics.record_audit(result.is_ok());

        match &result {
            Ok(audit) => info!(
                run_id = %audit.run_id,
                errors = audit.validation_summary.total_errors(),
                warnings = audit.validation_summary.total_warnings(),
                outlier_columns = audit.outlier_summary.columns.len(),
                retention_rate = audit.comparison_summary.retention_rate,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Audit complete"
            ),
            Err(e) => warn!(error = %e, "Audit failed"),
        }

        result
    }

    async fn execute(
        &self,
        current: Arc<Dataset>,
        previous: Arc<Dataset>,
    ) -> Result<AuditResult, AuditError> {
        self.check_primary_keys(&current, &previous)?;

        let mut ruleset = RuleSet::from_settings(&self.settings)?;
        let suggestion_findings = self.add_suggested_rules(&mut ruleset, &current).await;

        let stages = Stages {
            engine: RuleEngine::new(self.limits.rules).with_metrics(self.metrics.clone()),
            ruleset,
            detector: OutlierDetector::new(&self.settings.outlier, &self.settings.primary_keys)
                .with_metrics(self.metrics.clone()),
            reconciler: Reconciler::from_settings(
                &self.settings.primary_keys,
                &self.settings.comparison,
            )
            .with_metrics(self.metrics.clone()),
            primary_keys: self.settings.primary_keys.clone(),
        };

        tokio::task::spawn_blocking(move || stages.run(&current, &previous, suggestion_findings))
            .await?
    }

    fn check_primary_keys(&self, current: &Dataset, previous: &Dataset) -> Result<(), AuditError> {
        if self.settings.primary_keys.is_empty() {
            return Err(AuditError::Config(
                "no primary key columns configured".to_string(),
            ));
        }

        for (snapshot, dataset) in [(Snapshot::Current, current), (Snapshot::Previous, previous)] {
            if let Some(column) = self
                .settings
                .primary_keys
                .iter()
                .find(|k| !dataset.has_column(k))
            {
                return Err(AuditError::Config(format!(
                    "primary key column '{column}' is missing from the {snapshot} snapshot"
                )));
            }
        }

        Ok(())
    }

    /// Ask the suggester for rules and compile them into the rule set.
    ///
    /// Returns findings describing suggestions that could not be used.
    async fn add_suggested_rules(
        &self,
        ruleset: &mut RuleSet,
        current: &Dataset,
    ) -> Vec<ValidationFinding> {
        if !self.suggester.is_enabled() {
            return Vec::new();
        }

        let schema = SchemaSample::from_dataset(current, self.settings.llm_validator.sample_rows);
        let outcome = tokio::time::timeout(
            self.limits.suggest_timeout,
            self.suggester.suggest_rules(&schema),
        )
        .await
        .unwrap_or_else(|_| Err(SuggestError::Timeout(self.limits.suggest_timeout.as_millis() as u64)));

        let suggested = match outcome {
            Ok(rules) => {
                self.metrics.record_suggestion(true);
                rules
            }
            Err(e) => {
                self.metrics.record_suggestion(false);
                warn!(suggester = self.suggester.name(), error = %e, "Rule suggestion failed");
                return vec![ValidationFinding {
                    rule: SUGGESTION_RULE.to_string(),
                    severity: Severity::Warning,
                    origin: RuleOrigin::Suggested,
                    key: None,
                    message: format!("rule suggestion unavailable: {e}"),
                }];
            }
        };

        let mut findings = Vec::new();
        for rule in &suggested {
            match ruleset.add_custom(&rule.name, &rule.to_def(), RuleOrigin::Suggested) {
                Ok(()) => debug!(rule = %rule.name, "Accepted suggested rule"),
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "Rejected suggested rule");
                    findings.push(ValidationFinding::rule_failure(
                        rule.name.clone(),
                        RuleOrigin::Suggested,
                        e.to_string(),
                    ));
                }
            }
        }

        info!(
            suggester = self.suggester.name(),
            suggested = suggested.len(),
            rejected = findings.len(),
            "Rule suggestion complete"
        );

        findings
    }
}

/// The CPU-bound part of a run, owned so it can move to a blocking thread.
struct Stages {
    engine: RuleEngine,
    ruleset: RuleSet,
    detector: OutlierDetector,
    reconciler: Reconciler,
    primary_keys: Vec<String>,
}

impl Stages {
    fn run(
        self,
        current: &Dataset,
        previous: &Dataset,
        suggestion_findings: Vec<ValidationFinding>,
    ) -> Result<AuditResult, AuditError> {
        let Stages {
            engine,
            ruleset,
            detector,
            reconciler,
            primary_keys,
        } = self;

        info!(rows = current.row_count(), rules = ruleset.len(), "Validating current snapshot");
        let current_report = prepend_findings(suggestion_findings, engine.validate(current, &ruleset));

        info!(rows = previous.row_count(), rules = ruleset.len(), "Validating previous snapshot");
        let previous_report = engine.validate(previous, &ruleset);

        let outliers = detector.detect(current);
        let outlier_columns = outliers.summary(current.row_count());

        let partial = PartialAudit {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            primary_keys,
            validation_summary: ValidationSummary {
                current: current_report,
                previous: previous_report,
            },
            outlier_summary: OutlierOverview {
                findings: outliers,
                columns: outlier_columns,
            },
        };

        match reconciler.compare(current, previous) {
            Ok(comparison) => Ok(partial.complete(comparison)),
            Err(source) => Err(AuditError::Reconcile {
                source,
                partial: Box::new(partial),
            }),
        }
    }
}

/// Put suggestion findings ahead of the validation findings.
fn prepend_findings(mut findings: Vec<ValidationFinding>, report: ValidationReport) -> ValidationReport {
    if findings.is_empty() {
        return report;
    }
    findings.extend(report.findings);
    ValidationReport::from_findings(findings, report.rules, report.rows_checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CustomRuleDef, RowKey, Value};
    use crate::suggest::{DisabledSuggester, MockSuggester, SuggestedRule};
    use std::sync::atomic::Ordering;

    fn book(keys: &[&str]) -> Arc<Dataset> {
        Arc::new(
            Dataset::new(
                ["PolicyNumber", "Age"],
                keys.iter()
                    .enumerate()
                    .map(|(i, k)| vec![Value::from(*k), Value::from(30 + i as i64)])
                    .collect(),
            )
            .unwrap(),
        )
    }

    fn pipeline(settings: AuditSettings, suggester: Arc<dyn RuleSuggester>) -> AuditPipeline {
        AuditPipeline::new(settings, suggester, PipelineLimits::default())
    }

    fn suggested(name: &str, func: &str) -> SuggestedRule {
        SuggestedRule {
            name: name.to_string(),
            func: func.to_string(),
            columns: vec!["Age".to_string()],
            severity: Severity::Warning,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_run_produces_all_summaries() {
        let settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        let pipeline = pipeline(settings, Arc::new(DisabledSuggester));

        let result = pipeline
            .run(book(&["P1", "P2", "P3"]), book(&["P2", "P3", "P4"]))
            .await
            .unwrap();

        assert_eq!(result.primary_keys, vec!["PolicyNumber".to_string()]);
        assert_eq!(result.comparison_summary.retained_count(), 2);
        assert_eq!(result.validation_summary.total_errors(), 0);
        assert_eq!(pipeline.metrics().audits_total.load(Ordering::Relaxed), 1);
        assert_eq!(pipeline.metrics().reconciliations_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_missing_primary_key_is_config_error() {
        let settings = AuditSettings::with_primary_keys(["PolicyId"]);
        let pipeline = pipeline(settings, Arc::new(DisabledSuggester));

        let err = pipeline.run(book(&["P1"]), book(&["P1"])).await.unwrap_err();
        assert!(matches!(err, AuditError::Config(ref msg) if msg.contains("PolicyId")));
        assert_eq!(pipeline.metrics().audits_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_malformed_custom_rule_aborts_run() {
        let mut settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        settings.validator.custom_rules.insert(
            "broken".to_string(),
            CustomRuleDef {
                func: "Age >".to_string(),
                columns: vec!["Age".to_string()],
                severity: Severity::Error,
                message: None,
            },
        );
        let pipeline = pipeline(settings, Arc::new(DisabledSuggester));

        let err = pipeline.run(book(&["P1"]), book(&["P1"])).await.unwrap_err();
        assert!(matches!(err, AuditError::Rules(RuleError::InvalidExpression { ref rule, .. }) if rule == "broken"));
    }

    #[tokio::test]
    async fn test_duplicate_key_keeps_earlier_stages() {
        let settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        let pipeline = pipeline(settings, Arc::new(DisabledSuggester));

        let err = pipeline
            .run(book(&["P1", "P1", "P2"]), book(&["P1"]))
            .await
            .unwrap_err();

        match &err {
            AuditError::Reconcile {
                source: ReconcileError::DuplicateKey { key, .. },
                ..
            } => assert_eq!(key, &RowKey::from("P1")),
            other => panic!("unexpected error: {other}"),
        }

        let partial = err.partial().unwrap();
        let current = &partial.validation_summary.current;
        assert!(current
            .failed_rules
            .contains(&"primary_key_unique.PolicyNumber".to_string()));
        assert_eq!(current.total_errors, 2);
        assert_eq!(partial.validation_summary.previous.total_errors, 0);
        assert_eq!(pipeline.metrics().audits_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_stages_do_not_block_the_runtime() {
        let mut settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        settings.validator.custom_rules.insert(
            "age_limit".to_string(),
            CustomRuleDef {
                func: "Age * 2 + Age / 3 > 100000".to_string(),
                columns: vec!["Age".to_string()],
                severity: Severity::Warning,
                message: None,
            },
        );
        let pipeline = pipeline(settings, Arc::new(DisabledSuggester));
        let keys: Vec<String> = (0..20_000).map(|i| format!("P{i}")).collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

        let ticked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ticked.clone();
        let _ticker = tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        // A single-threaded runtime only polls the spawned task if run() yields
        pipeline.run(book(&keys), book(&keys)).await.unwrap();
        assert!(ticked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_suggested_rules_are_applied() {
        let settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        let suggester = Arc::new(MockSuggester::with_rules(vec![suggested("older_than_30", "Age > 30")]));
        let pipeline = pipeline(settings, suggester.clone());

        let result = pipeline.run(book(&["P1", "P2"]), book(&[])).await.unwrap();

        let current = &result.validation_summary.current;
        assert_eq!(current.total_warnings, 1);
        assert_eq!(current.findings[0].origin, RuleOrigin::Suggested);
        assert_eq!(current.findings[0].key.as_ref().map(|k| k.to_string()), Some("P2".to_string()));
        assert_eq!(suggester.received().len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_suggestion_recorded() {
        let settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        let suggester = Arc::new(MockSuggester::with_rules(vec![
            suggested("bad", "Age >>> 1"),
            suggested("good", "Age > 100"),
        ]));
        let pipeline = pipeline(settings, suggester);

        let result = pipeline.run(book(&["P1"]), book(&["P1"])).await.unwrap();

        let current = &result.validation_summary.current;
        assert_eq!(current.total_errors, 1);
        assert_eq!(current.failed_rules, vec!["bad".to_string()]);
        assert_eq!(current.findings[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_suggestion_failure_degrades_to_warning() {
        crate::observability::tracing::init_test_tracing();
        let settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        let suggester = Arc::new(MockSuggester::new());
        suggester.fail_with("connection refused");
        let pipeline = pipeline(settings, suggester);

        let result = pipeline.run(book(&["P1"]), book(&["P1"])).await.unwrap();

        let current = &result.validation_summary.current;
        assert_eq!(current.total_warnings, 1);
        assert_eq!(current.failed_rules, vec![SUGGESTION_RULE.to_string()]);
        assert!(current.findings[0].message.contains("connection refused"));
        assert_eq!(pipeline.metrics().suggestion_failures_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_suggestion_timeout() {
        let settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        let suggester = Arc::new(MockSuggester::with_rules(vec![suggested("late", "Age > 1")]));
        suggester.set_delay(Duration::from_secs(10));
        let limits = PipelineLimits {
            suggest_timeout: Duration::from_millis(20),
            ..PipelineLimits::default()
        };
        let pipeline = AuditPipeline::new(settings, suggester, limits);

        let result = pipeline.run(book(&["P1"]), book(&["P1"])).await.unwrap();

        let current = &result.validation_summary.current;
        assert_eq!(current.failed_rules, vec![SUGGESTION_RULE.to_string()]);
        assert!(current.findings[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_disabled_suggester_not_called() {
        let settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        let pipeline = pipeline(settings, Arc::new(DisabledSuggester));

        pipeline.run(book(&["P1"]), book(&["P1"])).await.unwrap();
        assert_eq!(pipeline.metrics().suggestion_calls_total.load(Ordering::Relaxed), 0);
    }
}
