use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::key::RowKey;
use super::value::Value;

/// Why a row was flagged as an outlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierReason {
    /// Value outside the `[p_low, p_high]` percentile band
    NumericTail,
    /// Category occurring below the rarity threshold
    RareCategory,
}

impl fmt::Display for OutlierReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierReason::NumericTail => write!(f, "numeric_tail"),
            OutlierReason::RareCategory => write!(f, "rare_category"),
        }
    }
}

/// One flagged row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedRow {
    pub key: RowKey,
    pub value: Value,
}

/// Inclusive percentile band for a tail finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TailBounds {
    pub lower: Value,
    pub upper: Value,
}

/// A rare category with its share of non-null rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RareValue {
    pub value: String,
    pub count: usize,
    pub percent: Decimal,
}

/// Flagged rows for a single column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierFinding {
    pub column: String,
    pub reason: OutlierReason,
    /// Flagged rows in dataset order
    pub rows: Vec<FlaggedRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<TailBounds>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rare_values: Vec<RareValue>,
}

impl OutlierFinding {
    /// Keys of the flagged rows.
    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.rows.iter().map(|r| &r.key)
    }

    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.rows.iter().any(|r| &r.key == key)
    }

    pub fn flagged(&self) -> usize {
        self.rows.len()
    }
}

/// Summary line for one column, as consumed by reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierSummary {
    pub column: String,
    pub reason: OutlierReason,
    pub outlier_count: usize,
    pub outlier_percent: Decimal,
    pub unique_outlier_values: usize,
}

/// Column name to finding. Columns without flagged rows are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OutlierReport {
    columns: BTreeMap<String, OutlierFinding>,
}

impl OutlierReport {
    pub fn new() -> Self {
        OutlierReport::default()
    }

    /// Record a finding. Findings with no flagged rows are dropped.
    pub fn insert(&mut self, finding: OutlierFinding) {
        if !finding.rows.is_empty() {
            self.columns.insert(finding.column.clone(), finding);
        }
    }

    pub fn get(&self, column: &str) -> Option<&OutlierFinding> {
        self.columns.get(column)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Findings in column name order.
    pub fn iter(&self) -> impl Iterator<Item = &OutlierFinding> {
        self.columns.values()
    }

    /// Per-column counts relative to the dataset size.
    pub fn summary(&self, row_count: usize) -> Vec<OutlierSummary> {
        self.iter()
            .map(|finding| {
                let outlier_count = finding.flagged();
                let outlier_percent = if row_count == 0 {
                    Decimal::ZERO
                } else {
                    (Decimal::from(outlier_count) * Decimal::ONE_HUNDRED / Decimal::from(row_count))
                        .round_dp(2)
                };
                let unique_outlier_values = finding
                    .rows
                    .iter()
                    .map(|r| r.value.canonical())
                    .collect::<BTreeSet<_>>()
                    .len();

                OutlierSummary {
                    column: finding.column.clone(),
                    reason: finding.reason,
                    outlier_count,
                    outlier_percent,
                    unique_outlier_values,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(column: &str, keys: &[&str]) -> OutlierFinding {
        OutlierFinding {
            column: column.to_string(),
            reason: OutlierReason::RareCategory,
            rows: keys
                .iter()
                .map(|k| FlaggedRow {
                    key: RowKey::from(*k),
                    value: Value::from("X"),
                })
                .collect(),
            bounds: None,
            rare_values: vec![],
        }
    }

    #[test]
    fn test_empty_findings_are_dropped() {
        let mut report = OutlierReport::new();
        report.insert(finding("Colour", &[]));
        assert!(report.is_empty());
        assert!(!report.contains_column("Colour"));
    }

    #[test]
    fn test_summary_percentages() {
        let mut report = OutlierReport::new();
        report.insert(finding("Colour", &["P1", "P2"]));

        let summary = report.summary(8);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].outlier_count, 2);
        assert_eq!(summary[0].outlier_percent, Decimal::new(25, 0));
        assert_eq!(summary[0].unique_outlier_values, 1);
    }

    #[test]
    fn test_report_serializes_as_map() {
        let mut report = OutlierReport::new();
        report.insert(finding("Colour", &["P1"]));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["Colour"]["reason"], "rare_category");
        assert_eq!(json["Colour"]["rows"][0]["key"], "P1");
    }
}
