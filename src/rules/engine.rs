use rayon::prelude::*;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{Dataset, RuleSummary, ValidationFinding, ValidationReport};
use crate::observability::MetricsRegistry;

use super::{EvalLimits, Rule, RuleContext, RuleFailure, RuleSet};

/// Runs a rule set against a dataset.
///
/// Rules are independent and read the dataset without mutating it, so
/// they run in parallel. Results are merged afterwards in rule order.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    limits: EvalLimits,
    metrics: Option<Arc<MetricsRegistry>>,
}

/// Result of running one rule.
struct RuleOutcome {
    findings: Vec<ValidationFinding>,
    failed: bool,
}

impl RuleEngine {
    /// Create a new engine with the given evaluation limits.
    pub fn new(limits: EvalLimits) -> Self {
        RuleEngine {
            limits,
            metrics: None,
        }
    }

    /// Record rule counts in a metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn limits(&self) -> &EvalLimits {
        &self.limits
    }

    /// Validate a dataset.
    ///
    /// Never fails: a rule that cannot be evaluated contributes one error
    /// finding under its name and the remaining rules still run.
    pub fn validate(&self, dataset: &Dataset, ruleset: &RuleSet) -> ValidationReport {
        if dataset.is_empty() || ruleset.is_empty() {
            debug!(
                rows = dataset.row_count(),
                rules = ruleset.len(),
                "Nothing to validate"
            );
            return ValidationReport::from_findings(Vec::new(), Vec::new(), dataset.row_count());
        }

        let keys = dataset.row_keys(ruleset.primary_keys());
        let ctx = RuleContext::new(dataset, &keys, &self.limits);

        let outcomes: Vec<RuleOutcome> = ruleset
            .rules()
            .par_iter()
            .map(|rule| self.run_rule(rule, &ctx))
            .collect();

        let mut findings = Vec::new();
        let mut summaries = Vec::with_capacity(outcomes.len());
        for (rule, outcome) in ruleset.rules().iter().zip(outcomes) {
            if let Some(metrics) = &self.metrics {
                metrics.record_rule_evaluation(outcome.findings.len(), outcome.failed);
            }
            summaries.push(RuleSummary {
                rule: rule.name().to_string(),
                severity: rule.severity(),
                origin: rule.origin(),
                findings: outcome.findings.len(),
                failed: outcome.failed,
            });
            findings.extend(outcome.findings);
        }

        let report = ValidationReport::from_findings(findings, summaries, dataset.row_count());

        if let Some(metrics) = &self.metrics {
            metrics.record_findings(crate::domain::Severity::Error, report.total_errors);
            metrics.record_findings(crate::domain::Severity::Warning, report.total_warnings);
        }

        debug!(
            rows = report.rows_checked,
            rules = ruleset.len(),
            errors = report.total_errors,
            warnings = report.total_warnings,
            "Validation complete"
        );

        report
    }

    fn run_rule(&self, rule: &Rule, ctx: &RuleContext<'_>) -> RuleOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| rule.check(ctx)))
            .unwrap_or_else(|payload| Err(RuleFailure::Panicked(panic_message(payload))));

        match result {
            Ok(findings) => RuleOutcome {
                findings,
                failed: false,
            },
            Err(failure) => {
                warn!(rule = rule.name(), error = %failure, "Rule could not be evaluated");
                RuleOutcome {
                    findings: vec![ValidationFinding::rule_failure(
                        rule.name(),
                        rule.origin(),
                        failure.to_string(),
                    )],
                    failed: true,
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
