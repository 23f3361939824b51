use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{ComparisonReport, OutlierReport, OutlierSummary, ValidationReport};

/// Validation reports for both snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub current: ValidationReport,
    pub previous: ValidationReport,
}

impl ValidationSummary {
    pub fn total_errors(&self) -> usize {
        self.current.total_errors + self.previous.total_errors
    }

    pub fn total_warnings(&self) -> usize {
        self.current.total_warnings + self.previous.total_warnings
    }
}

/// Outlier findings on the current snapshot plus per-column counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierOverview {
    pub findings: OutlierReport,
    pub columns: Vec<OutlierSummary>,
}

/// Everything one audit run hands to reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditResult {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub primary_keys: Vec<String>,
    pub validation_summary: ValidationSummary,
    pub outlier_summary: OutlierOverview,
    pub comparison_summary: ComparisonReport,
}

impl AuditResult {
    /// Whether any error-severity finding was recorded in either snapshot.
    pub fn has_errors(&self) -> bool {
        self.validation_summary.total_errors() > 0
    }
}

/// Results of the stages that ran before reconciliation.
///
/// Returned alone when reconciliation fails, so validation and outlier
/// findings are still reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialAudit {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub primary_keys: Vec<String>,
    pub validation_summary: ValidationSummary,
    pub outlier_summary: OutlierOverview,
}

impl PartialAudit {
    pub fn complete(self, comparison_summary: ComparisonReport) -> AuditResult {
        AuditResult {
            run_id: self.run_id,
            generated_at: self.generated_at,
            primary_keys: self.primary_keys,
            validation_summary: self.validation_summary,
            outlier_summary: self.outlier_summary,
            comparison_summary,
        }
    }
}
