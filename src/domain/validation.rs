use serde::Serialize;

use super::key::RowKey;
use super::severity::Severity;

/// Where a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    BuiltIn,
    Custom,
    /// Proposed by the rule suggester at run time
    Suggested,
}

/// A single recorded rule violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFinding {
    /// The rule that produced the finding
    pub rule: String,

    pub severity: Severity,

    pub origin: RuleOrigin,

    /// Primary key of the violating row; absent for rule-level findings
    /// such as a missing column or a failed evaluation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<RowKey>,

    pub message: String,
}

impl ValidationFinding {
    /// Finding for one violating row.
    pub fn row(
        rule: impl Into<String>,
        severity: Severity,
        origin: RuleOrigin,
        key: RowKey,
        message: impl Into<String>,
    ) -> Self {
        ValidationFinding {
            rule: rule.into(),
            severity,
            origin,
            key: Some(key),
            message: message.into(),
        }
    }

    /// Rule-level finding. Always error severity.
    pub fn rule_failure(
        rule: impl Into<String>,
        origin: RuleOrigin,
        message: impl Into<String>,
    ) -> Self {
        ValidationFinding {
            rule: rule.into(),
            severity: Severity::Error,
            origin,
            key: None,
            message: message.into(),
        }
    }
}

/// Per-rule outcome, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSummary {
    pub rule: String,
    pub severity: Severity,
    pub origin: RuleOrigin,
    /// Number of findings the rule produced
    pub findings: usize,
    /// Whether the rule could not be evaluated
    pub failed: bool,
}

/// Ordered findings plus aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub findings: Vec<ValidationFinding>,
    pub total_errors: usize,
    pub total_warnings: usize,
    /// Rules with at least one finding, in first-violation order
    pub failed_rules: Vec<String>,
    pub rules: Vec<RuleSummary>,
    pub rows_checked: usize,
}

impl ValidationReport {
    /// An empty report with zero counts.
    pub fn empty() -> Self {
        ValidationReport::default()
    }

    /// Aggregate findings that are already in evaluation order.
    pub fn from_findings(
        findings: Vec<ValidationFinding>,
        rules: Vec<RuleSummary>,
        rows_checked: usize,
    ) -> Self {
        let total_errors = findings.iter().filter(|f| f.severity.is_error()).count();
        let total_warnings = findings.iter().filter(|f| f.severity.is_warning()).count();

        let mut failed_rules: Vec<String> = Vec::new();
        for finding in &findings {
            if !failed_rules.iter().any(|r| r == &finding.rule) {
                failed_rules.push(finding.rule.clone());
            }
        }

        ValidationReport {
            findings,
            total_errors,
            total_warnings,
            failed_rules,
            rules,
            rows_checked,
        }
    }

    /// Append findings produced outside the rule pass, keeping counts in step.
    pub fn extend(&mut self, extra: impl IntoIterator<Item = ValidationFinding>) {
        let mut findings = std::mem::take(&mut self.findings);
        findings.extend(extra);
        let rules = std::mem::take(&mut self.rules);
        *self = ValidationReport::from_findings(findings, rules, self.rows_checked);
    }

    /// True when no findings were recorded.
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Findings produced by one rule.
    pub fn findings_for<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a ValidationFinding> {
        self.findings.iter().filter(move |f| f.rule == rule)
    }
}
