use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{
    ColumnType, Dataset, FlaggedRow, OutlierFinding, OutlierReason, OutlierReport,
    OutlierSettings, RareValue, RowKey, TailBounds, Value,
};
use crate::observability::MetricsRegistry;

use super::percentile::tail_bounds;

/// Flags numeric tails and rare categories column by column.
#[derive(Debug, Clone)]
pub struct OutlierDetector {
    percentile_threshold: Decimal,
    rare_category_threshold: Decimal,
    max_categories: usize,
    include_dates: bool,
    /// Primary key columns, never analysed
    key_columns: Vec<String>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl OutlierDetector {
    /// Create a new detector from outlier settings.
    pub fn new(settings: &OutlierSettings, primary_keys: &[String]) -> Self {
        OutlierDetector {
            percentile_threshold: settings.percentile_threshold,
            rare_category_threshold: settings.rare_category_threshold,
            max_categories: settings.max_categories,
            include_dates: settings.include_dates,
            key_columns: primary_keys.to_vec(),
            metrics: None,
        }
    }

    /// Override both thresholds.
    pub fn with_thresholds(mut self, percentile_threshold: Decimal, rare_category_threshold: Decimal) -> Self {
        self.percentile_threshold = percentile_threshold;
        self.rare_category_threshold = rare_category_threshold;
        self
    }

    /// Record flagged column counts in a metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Detect outliers in every eligible column.
    ///
    /// Deterministic: the same dataset and thresholds always give the same
    /// report.
    pub fn detect(&self, dataset: &Dataset) -> OutlierReport {
        let keys = dataset.row_keys(&self.key_columns);

        let findings: Vec<Option<OutlierFinding>> = (0..dataset.columns().len())
            .into_par_iter()
            .map(|column| self.detect_column(dataset, &keys, column))
            .collect();

        let mut report = OutlierReport::new();
        for finding in findings.into_iter().flatten() {
            report.insert(finding);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_outlier_columns(report.len());
        }

        debug!(
            columns = dataset.columns().len(),
            flagged_columns = report.len(),
            "Outlier detection complete"
        );

        report
    }

    fn detect_column(&self, dataset: &Dataset, keys: &[RowKey], column: usize) -> Option<OutlierFinding> {
        let name = &dataset.columns()[column];
        if self.key_columns.iter().any(|k| k == name) {
            return None;
        }

        let non_null = dataset.column_values(column).filter(|v| !v.is_null()).count();
        if non_null < 2 {
            return None;
        }

        match dataset.column_types()[column] {
            ColumnType::Number => self.numeric_tail(dataset, keys, column, ordinal_number),
            ColumnType::Date if self.include_dates => {
                self.numeric_tail(dataset, keys, column, ordinal_date)
            }
            ty if ty.is_categorical() => self.rare_categories(dataset, keys, column, non_null),
            _ => None,
        }
    }

    fn numeric_tail(
        &self,
        dataset: &Dataset,
        keys: &[RowKey],
        column: usize,
        ordinal: fn(&Value) -> Option<Decimal>,
    ) -> Option<OutlierFinding> {
        let mut sorted: Vec<Decimal> = dataset.column_values(column).filter_map(ordinal).collect();
        sorted.sort();

        let (lower, upper) = tail_bounds(&sorted, self.percentile_threshold)?;

        let rows = dataset
            .column_values(column)
            .zip(keys)
            .filter(|(value, _)| ordinal(value).is_some_and(|x| x < lower || x > upper))
            .map(|(value, key)| FlaggedRow {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();

        let bounds = match dataset.column_types()[column] {
            ColumnType::Date => TailBounds {
                lower: day_to_value(lower.ceil()),
                upper: day_to_value(upper.floor()),
            },
            _ => TailBounds {
                lower: Value::Number(lower.normalize()),
                upper: Value::Number(upper.normalize()),
            },
        };

        Some(OutlierFinding {
            column: dataset.columns()[column].clone(),
            reason: OutlierReason::NumericTail,
            rows,
            bounds: Some(bounds),
            rare_values: Vec::new(),
        })
    }

    fn rare_categories(
        &self,
        dataset: &Dataset,
        keys: &[RowKey],
        column: usize,
        non_null: usize,
    ) -> Option<OutlierFinding> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for value in dataset.column_values(column).filter(|v| !v.is_null()) {
            *counts.entry(value.canonical()).or_insert(0) += 1;
            if counts.len() > self.max_categories {
                return None;
            }
        }

        let total = Decimal::from(non_null);
        let rare_values: Vec<RareValue> = counts
            .into_iter()
            .filter_map(|(value, count)| {
                let percent = Decimal::from(count) * Decimal::ONE_HUNDRED / total;
                (percent < self.rare_category_threshold).then(|| RareValue {
                    value,
                    count,
                    percent: percent.round_dp(4).normalize(),
                })
            })
            .collect();

        if rare_values.is_empty() {
            return None;
        }

        let rows = dataset
            .column_values(column)
            .zip(keys)
            .filter(|(value, _)| {
                !value.is_null() && {
                    let canonical = value.canonical();
                    rare_values.iter().any(|r| r.value == canonical)
                }
            })
            .map(|(value, key)| FlaggedRow {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();

        Some(OutlierFinding {
            column: dataset.columns()[column].clone(),
            reason: OutlierReason::RareCategory,
            rows,
            bounds: None,
            rare_values,
        })
    }
}

fn ordinal_number(value: &Value) -> Option<Decimal> {
    value.as_decimal()
}

/// Dates are measured in days since the common era.
fn ordinal_date(value: &Value) -> Option<Decimal> {
    value.as_date().map(|d| Decimal::from(d.num_days_from_ce()))
}

fn day_to_value(day: Decimal) -> Value {
    use rust_decimal::prelude::ToPrimitive;

    day.to_i32()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .map(Value::Date)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn premiums() -> Dataset {
        let values = [80, 90, 95, 100, 200, 300, 400, 500, 600, 700, 800, 900, 1000];
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| vec![Value::from(format!("P{}", i + 1)), Value::from(*v)])
            .collect();
        Dataset::new(["PolicyNumber", "premium"], rows).unwrap()
    }

    fn detector() -> OutlierDetector {
        OutlierDetector::new(&OutlierSettings::default(), &["PolicyNumber".to_string()])
    }

    fn flagged_keys(finding: &OutlierFinding) -> Vec<String> {
        finding.keys().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_numeric_tails() {
        let report = detector().detect(&premiums());

        let finding = report.get("premium").unwrap();
        assert_eq!(finding.reason, OutlierReason::NumericTail);
        // Bounds are 91 and 880
        assert_eq!(flagged_keys(finding), vec!["P1", "P2", "P12", "P13"]);
        let bounds = finding.bounds.as_ref().unwrap();
        assert_eq!(bounds.lower, Value::from(91));
        assert_eq!(bounds.upper, Value::from(880));
    }

    #[test]
    fn test_key_columns_never_analysed() {
        let report = detector().detect(&premiums());
        assert!(!report.contains_column("PolicyNumber"));
    }

    #[test]
    fn test_rare_categories() {
        let mut rows: Vec<Vec<Value>> = (0..199)
            .map(|i| vec![Value::from(format!("P{i}")), Value::from("Blue")])
            .collect();
        rows.push(vec![Value::from("P199"), Value::from("Mauve")]);
        let dataset = Dataset::new(["PolicyNumber", "Colour"], rows).unwrap();

        let report = detector().detect(&dataset);
        let finding = report.get("Colour").unwrap();

        assert_eq!(finding.reason, OutlierReason::RareCategory);
        assert_eq!(flagged_keys(finding), vec!["P199"]);
        assert_eq!(finding.rare_values.len(), 1);
        assert_eq!(finding.rare_values[0].value, "Mauve");
        assert_eq!(finding.rare_values[0].percent, Decimal::new(5, 1));
    }

    #[test]
    fn test_high_cardinality_text_skipped() {
        let rows = (0..60)
            .map(|i| vec![Value::from(format!("P{i}")), Value::from(format!("Name{i}"))])
            .collect();
        let dataset = Dataset::new(["PolicyNumber", "Name"], rows).unwrap();

        assert!(detector().detect(&dataset).is_empty());
    }

    #[test]
    fn test_sparse_columns_skipped() {
        let dataset = Dataset::new(
            ["PolicyNumber", "premium", "notes"],
            vec![
                vec![Value::from("P1"), Value::from(10), Value::Null],
                vec![Value::from("P2"), Value::Null, Value::Null],
            ],
        )
        .unwrap();

        assert!(detector().detect(&dataset).is_empty());
    }

    #[test]
    fn test_date_tails() {
        let rows = (1..=11)
            .map(|day| {
                vec![
                    Value::from(format!("P{day}")),
                    Value::Date(NaiveDate::from_ymd_opt(2024, 1, day).unwrap()),
                ]
            })
            .collect();
        let dataset = Dataset::new(["PolicyNumber", "CoverStartDate"], rows).unwrap();

        let report = detector().detect(&dataset);
        let finding = report.get("CoverStartDate").unwrap();
        assert_eq!(flagged_keys(finding), vec!["P1", "P11"]);

        let dates_off = OutlierSettings {
            include_dates: false,
            ..OutlierSettings::default()
        };
        let report = OutlierDetector::new(&dates_off, &["PolicyNumber".to_string()]).detect(&dataset);
        assert!(report.is_empty());
    }

    #[test]
    fn test_zero_threshold_flags_nothing() {
        let report = detector()
            .with_thresholds(Decimal::ZERO, Decimal::ZERO)
            .detect(&premiums());
        assert!(report.is_empty());
    }

    #[test]
    fn test_detection_is_idempotent() {
        let dataset = premiums();
        assert_eq!(detector().detect(&dataset), detector().detect(&dataset));
    }

    fn numbers(values: &[i64]) -> Dataset {
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| vec![Value::from(format!("P{}", i + 1)), Value::from(*v)])
            .collect();
        Dataset::new(["PolicyNumber", "premium"], rows).unwrap()
    }

    #[test]
    fn test_ties_on_cut_point_all_kept() {
        // Rows are shuffled so tied values are not adjacent
        let values = [90, 10, 50, 10, 90, 30, 20, 10, 40, 60, 90, 70, 80];
        let mut sorted: Vec<Decimal> = values.iter().map(|v| Decimal::from(*v)).collect();
        sorted.sort();
        assert_eq!(
            tail_bounds(&sorted, Decimal::TEN),
            Some((Decimal::from(10), Decimal::from(90)))
        );

        let report = detector().detect(&numbers(&values));
        assert!(!report.contains_column("premium"));
    }

    #[test]
    fn test_ties_below_cut_point_all_flagged() {
        let mut values = vec![50; 17];
        for position in [2, 9, 15] {
            values.insert(position, 1);
        }

        // h = 19 * 0.15 = 2.85, so the lower bound sits between 1 and 50
        let report = detector()
            .with_thresholds(Decimal::from(15), Decimal::ONE)
            .detect(&numbers(&values));

        let finding = report.get("premium").unwrap();
        assert_eq!(flagged_keys(finding), vec!["P3", "P10", "P16"]);
        assert!(finding.rows.iter().all(|row| row.value == Value::from(1)));
    }

    #[test]
    fn test_constant_columns_never_flagged() {
        let rows = (0..10)
            .map(|i| {
                vec![
                    Value::from(format!("P{i}")),
                    Value::from(500),
                    Value::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
                    Value::from("Blue"),
                ]
            })
            .collect();
        let dataset = Dataset::new(["PolicyNumber", "premium", "CoverStartDate", "Colour"], rows).unwrap();

        let report = detector()
            .with_thresholds(Decimal::from(49), Decimal::from(99))
            .detect(&dataset);
        assert!(report.is_empty());
    }
}
