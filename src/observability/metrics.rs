use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::Severity;

/// Metrics registry for audit runs.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Completed pipeline runs
    pub audits_total: AtomicU64,
    pub audits_failed: AtomicU64,

    /// Audit duration buckets (milliseconds)
    pub duration_under_100ms: AtomicU64,
    pub duration_100ms_1s: AtomicU64,
    pub duration_1_10s: AtomicU64,
    pub duration_10_60s: AtomicU64,
    pub duration_over_60s: AtomicU64,

    /// Rule evaluation counts
    pub rules_evaluated_total: AtomicU64,
    pub rules_with_findings_total: AtomicU64,
    pub rule_failures_total: AtomicU64,

    /// Findings by severity
    pub findings_error_total: AtomicU64,
    pub findings_warning_total: AtomicU64,

    /// Columns with at least one outlier
    pub outlier_columns_total: AtomicU64,

    pub reconciliations_total: AtomicU64,

    /// Rule suggestion calls
    pub suggestion_calls_total: AtomicU64,
    pub suggestion_failures_total: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record the outcome of a pipeline run.
    pub fn record_audit(&self, success: bool) {
        self.audits_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.audits_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record audit duration.
    pub fn record_duration(&self, start: Instant) {
        let millis = start.elapsed().as_millis() as u64;

        if millis < 100 {
            self.duration_under_100ms.fetch_add(1, Ordering::Relaxed);
        } else if millis < 1_000 {
            self.duration_100ms_1s.fetch_add(1, Ordering::Relaxed);
        } else if millis < 10_000 {
            self.duration_1_10s.fetch_add(1, Ordering::Relaxed);
        } else if millis < 60_000 {
            self.duration_10_60s.fetch_add(1, Ordering::Relaxed);
        } else {
            self.duration_over_60s.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rule evaluation.
    pub fn record_rule_evaluation(&self, findings: usize, failed: bool) {
        self.rules_evaluated_total.fetch_add(1, Ordering::Relaxed);
        if findings > 0 {
            self.rules_with_findings_total.fetch_add(1, Ordering::Relaxed);
        }
        if failed {
            self.rule_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record findings of one severity.
    pub fn record_findings(&self, severity: Severity, count: usize) {
        let counter = match severity {
            Severity::Error => &self.findings_error_total,
            Severity::Warning => &self.findings_warning_total,
        };
        counter.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_outlier_columns(&self, count: usize) {
        self.outlier_columns_total
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_reconciliation(&self) {
        self.reconciliations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rule suggestion call.
    pub fn record_suggestion(&self, success: bool) {
        self.suggestion_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.suggestion_failures_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP bookaudit_audits_total Total number of audit runs
# TYPE bookaudit_audits_total counter
bookaudit_audits_total {}

# HELP bookaudit_audits_failed_total Audit runs stopped by a fatal error
# TYPE bookaudit_audits_failed_total counter
bookaudit_audits_failed_total {}

# HELP bookaudit_audit_duration_bucket Audit duration histogram
# TYPE bookaudit_audit_duration_bucket counter
bookaudit_audit_duration_bucket{{le="0.1"}} {}
bookaudit_audit_duration_bucket{{le="1"}} {}
bookaudit_audit_duration_bucket{{le="10"}} {}
bookaudit_audit_duration_bucket{{le="60"}} {}
bookaudit_audit_duration_bucket{{le="+Inf"}} {}

# HELP bookaudit_rules_evaluated_total Total rule evaluations
# TYPE bookaudit_rules_evaluated_total counter
bookaudit_rules_evaluated_total {}

# HELP bookaudit_rules_with_findings_total Rule evaluations that produced findings
# TYPE bookaudit_rules_with_findings_total counter
bookaudit_rules_with_findings_total {}

# HELP bookaudit_rule_failures_total Rules that could not be evaluated
# TYPE bookaudit_rule_failures_total counter
bookaudit_rule_failures_total {}

# HELP bookaudit_findings Validation findings by severity
# TYPE bookaudit_findings counter
bookaudit_findings{{severity="error"}} {}
bookaudit_findings{{severity="warning"}} {}

# HELP bookaudit_outlier_columns_total Columns with flagged outliers
# TYPE bookaudit_outlier_columns_total counter
bookaudit_outlier_columns_total {}

# HELP bookaudit_reconciliations_total Snapshot reconciliations
# TYPE bookaudit_reconciliations_total counter
bookaudit_reconciliations_total {}

# HELP bookaudit_suggestion_calls_total Rule suggestion requests
# TYPE bookaudit_suggestion_calls_total counter
bookaudit_suggestion_calls_total {}

# HELP bookaudit_suggestion_failures_total Failed rule suggestion requests
# TYPE bookaudit_suggestion_failures_total counter
bookaudit_suggestion_failures_total {}
"#,
            self.audits_total.load(Ordering::Relaxed),
            self.audits_failed.load(Ordering::Relaxed),
            self.duration_under_100ms.load(Ordering::Relaxed),
            self.duration_100ms_1s.load(Ordering::Relaxed),
            self.duration_1_10s.load(Ordering::Relaxed),
            self.duration_10_60s.load(Ordering::Relaxed),
            self.duration_over_60s.load(Ordering::Relaxed),
            self.rules_evaluated_total.load(Ordering::Relaxed),
            self.rules_with_findings_total.load(Ordering::Relaxed),
            self.rule_failures_total.load(Ordering::Relaxed),
            self.findings_error_total.load(Ordering::Relaxed),
            self.findings_warning_total.load(Ordering::Relaxed),
            self.outlier_columns_total.load(Ordering::Relaxed),
            self.reconciliations_total.load(Ordering::Relaxed),
            self.suggestion_calls_total.load(Ordering::Relaxed),
            self.suggestion_failures_total.load(Ordering::Relaxed),
        )
    }
}

/// Guard for timing an audit run.
pub struct TimingGuard<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        TimingGuard {
            registry,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.registry.record_duration(self.start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rule_evaluation() {
        let metrics = MetricsRegistry::new();

        metrics.record_rule_evaluation(0, false);
        metrics.record_rule_evaluation(3, false);
        metrics.record_rule_evaluation(1, true);

        assert_eq!(metrics.rules_evaluated_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.rules_with_findings_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.rule_failures_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_timing_guard_records_duration() {
        let metrics = MetricsRegistry::new();
        {
            let _guard = TimingGuard::new(&metrics);
        }

        assert_eq!(metrics.duration_under_100ms.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = MetricsRegistry::new();
        metrics.record_audit(true);
        metrics.record_findings(Severity::Warning, 4);

        let output = metrics.to_prometheus();

        assert!(output.contains("bookaudit_audits_total 1"));
        assert!(output.contains("bookaudit_findings{severity=\"warning\"} 4"));
        assert!(output.contains("bookaudit_findings{severity=\"error\"} 0"));
    }
}
