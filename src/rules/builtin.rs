use ahash::AHashMap;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;

use crate::domain::{
    Dataset, RowKey, RuleOrigin, Severity, ValidatorSettings, ValidationFinding, Value,
};
use crate::rules::{RuleContext, RuleFailure};

/// Built-in check and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltInKind {
    RequiredColumn { column: String },
    PrimaryKeyNotNull { columns: Vec<String> },
    PrimaryKeyUnique { columns: Vec<String> },
    NotNull { column: String },
    DateFormat { column: String, format: String },
    DateOrder { start: String, end: String, format: String },
    AllowedValues { column: String, values: Vec<String> },
    Positive { column: String },
    MinValue { column: String, min: Decimal },
}

impl BuiltInKind {
    /// Kind name, the first half of the rule name.
    pub fn label(&self) -> &'static str {
        match self {
            BuiltInKind::RequiredColumn { .. } => "required_column",
            BuiltInKind::PrimaryKeyNotNull { .. } => "primary_key_not_null",
            BuiltInKind::PrimaryKeyUnique { .. } => "primary_key_unique",
            BuiltInKind::NotNull { .. } => "not_null",
            BuiltInKind::DateFormat { .. } => "date_format",
            BuiltInKind::DateOrder { .. } => "date_order",
            BuiltInKind::AllowedValues { .. } => "allowed_values",
            BuiltInKind::Positive { .. } => "positive",
            BuiltInKind::MinValue { .. } => "min_value",
        }
    }

    /// Column part of the rule name.
    fn target(&self) -> String {
        match self {
            BuiltInKind::PrimaryKeyNotNull { columns } | BuiltInKind::PrimaryKeyUnique { columns } => {
                columns.join("+")
            }
            BuiltInKind::DateOrder { start, end, .. } => format!("{start}+{end}"),
            BuiltInKind::RequiredColumn { column }
            | BuiltInKind::NotNull { column }
            | BuiltInKind::DateFormat { column, .. }
            | BuiltInKind::AllowedValues { column, .. }
            | BuiltInKind::Positive { column }
            | BuiltInKind::MinValue { column, .. } => column.clone(),
        }
    }

    fn default_message(&self) -> String {
        match self {
            BuiltInKind::RequiredColumn { column } => {
                format!("Required column '{column}' is missing")
            }
            BuiltInKind::PrimaryKeyNotNull { columns } => {
                format!("Primary key ({}) has a null component", columns.join(", "))
            }
            BuiltInKind::PrimaryKeyUnique { columns } => {
                format!("Primary key ({}) is not unique", columns.join(", "))
            }
            BuiltInKind::NotNull { column } => format!("{column} must not be null"),
            BuiltInKind::DateFormat { column, format } => {
                format!("{column} does not match date format {format}")
            }
            BuiltInKind::DateOrder { start, end, .. } => {
                format!("{end} is before {start}")
            }
            BuiltInKind::AllowedValues { column, values } => {
                format!("{column} must be one of: {}", values.join(", "))
            }
            BuiltInKind::Positive { column } => format!("{column} must be greater than 0"),
            BuiltInKind::MinValue { column, min } => format!("{column} is below minimum {min}"),
        }
    }
}

impl fmt::Display for BuiltInKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.label(), self.target())
    }
}

/// A built-in rule instantiated for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltInRule {
    pub name: String,
    pub kind: BuiltInKind,
    pub severity: Severity,
    pub message: String,
}

impl BuiltInRule {
    /// Create a new built-in rule named `<kind>.<column>`.
    pub fn new(kind: BuiltInKind, severity: Severity) -> Self {
        BuiltInRule {
            name: kind.to_string(),
            message: kind.default_message(),
            kind,
            severity,
        }
    }

    /// Built-in rules for the configured key and validator settings, in
    /// evaluation order.
    pub fn from_settings(primary_keys: &[String], validator: &ValidatorSettings) -> Vec<Self> {
        let mut rules = Vec::new();
        let error = |kind| BuiltInRule::new(kind, Severity::Error);

        let mut required: Vec<&String> = primary_keys.iter().collect();
        for column in &validator.required_columns {
            if !required.contains(&column) {
                required.push(column);
            }
        }
        for column in required {
            rules.push(error(BuiltInKind::RequiredColumn {
                column: column.clone(),
            }));
        }

        if !primary_keys.is_empty() {
            rules.push(error(BuiltInKind::PrimaryKeyNotNull {
                columns: primary_keys.to_vec(),
            }));
            rules.push(error(BuiltInKind::PrimaryKeyUnique {
                columns: primary_keys.to_vec(),
            }));
        }

        for column in &validator.not_null_columns {
            rules.push(error(BuiltInKind::NotNull {
                column: column.clone(),
            }));
        }

        for column in &validator.date_columns {
            rules.push(error(BuiltInKind::DateFormat {
                column: column.clone(),
                format: validator.date_format.clone(),
            }));
        }

        for order in &validator.date_order {
            rules.push(error(BuiltInKind::DateOrder {
                start: order.start.clone(),
                end: order.end.clone(),
                format: validator.date_format.clone(),
            }));
        }

        if !validator.gender_values.is_empty() {
            rules.push(error(BuiltInKind::AllowedValues {
                column: validator.gender_column.clone(),
                values: validator.gender_values.clone(),
            }));
        }
        for (column, values) in &validator.allowed_values {
            rules.push(error(BuiltInKind::AllowedValues {
                column: column.clone(),
                values: values.clone(),
            }));
        }

        for column in &validator.positive_columns {
            rules.push(error(BuiltInKind::Positive {
                column: column.clone(),
            }));
        }

        if let Some(min) = validator.min_premium {
            rules.push(BuiltInRule::new(
                BuiltInKind::MinValue {
                    column: validator.premium_column.clone(),
                    min,
                },
                Severity::Warning,
            ));
        }
        for (column, min) in &validator.min_values {
            rules.push(BuiltInRule::new(
                BuiltInKind::MinValue {
                    column: column.clone(),
                    min: *min,
                },
                Severity::Warning,
            ));
        }

        rules
    }

    /// Evaluate the rule over a dataset.
    pub fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<ValidationFinding>, RuleFailure> {
        let dataset = ctx.dataset;

        match &self.kind {
            BuiltInKind::RequiredColumn { column } => {
                if dataset.has_column(column) {
                    Ok(Vec::new())
                } else {
                    Ok(vec![ValidationFinding {
                        rule: self.name.clone(),
                        severity: self.severity,
                        origin: RuleOrigin::BuiltIn,
                        key: None,
                        message: self.message.clone(),
                    }])
                }
            }
            BuiltInKind::PrimaryKeyNotNull { columns } => {
                let slots = resolve(dataset, columns)?;
                Ok(self.flag_rows(ctx, |row| slots.iter().any(|&c| row[c].is_null())))
            }
            BuiltInKind::PrimaryKeyUnique { columns } => {
                resolve(dataset, columns)?;
                let mut counts: AHashMap<&RowKey, usize> = AHashMap::with_capacity(ctx.keys.len());
                for key in ctx.keys {
                    *counts.entry(key).or_insert(0) += 1;
                }
                Ok(ctx
                    .keys
                    .iter()
                    .filter(|key| counts.get(key).copied().unwrap_or(0) > 1)
                    .map(|key| self.finding(key))
                    .collect())
            }
            BuiltInKind::NotNull { column } => {
                let c = resolve_one(dataset, column)?;
                Ok(self.flag_rows(ctx, |row| row[c].is_null()))
            }
            BuiltInKind::DateFormat { column, format } => {
                let c = resolve_one(dataset, column)?;
                Ok(self.flag_rows(ctx, |row| match &row[c] {
                    Value::Null | Value::Date(_) => false,
                    Value::Text(s) => NaiveDate::parse_from_str(s.trim(), format).is_err(),
                    _ => true,
                }))
            }
            BuiltInKind::DateOrder { start, end, format } => {
                let s = resolve_one(dataset, start)?;
                let e = resolve_one(dataset, end)?;
                Ok(self.flag_rows(ctx, |row| {
                    match (as_date(&row[s], format), as_date(&row[e], format)) {
                        (Some(start), Some(end)) => end < start,
                        _ => false,
                    }
                }))
            }
            BuiltInKind::AllowedValues { column, values } => {
                let c = resolve_one(dataset, column)?;
                Ok(self.flag_rows(ctx, |row| {
                    let value = &row[c];
                    !value.is_null() && !values.iter().any(|v| v == &value.canonical())
                }))
            }
            BuiltInKind::Positive { column } => {
                let c = resolve_one(dataset, column)?;
                Ok(self.flag_rows(ctx, |row| match &row[c] {
                    Value::Null => false,
                    Value::Number(n) => *n <= Decimal::ZERO,
                    _ => true,
                }))
            }
            BuiltInKind::MinValue { column, min } => {
                let c = resolve_one(dataset, column)?;
                Ok(self.flag_rows(ctx, |row| match &row[c] {
                    Value::Null => false,
                    Value::Number(n) => n < min,
                    _ => true,
                }))
            }
        }
    }

    fn finding(&self, key: &RowKey) -> ValidationFinding {
        ValidationFinding::row(
            &self.name,
            self.severity,
            RuleOrigin::BuiltIn,
            key.clone(),
            &self.message,
        )
    }

    fn flag_rows<F>(&self, ctx: &RuleContext<'_>, violates: F) -> Vec<ValidationFinding>
    where
        F: Fn(&[Value]) -> bool,
    {
        ctx.dataset
            .rows()
            .iter()
            .zip(ctx.keys)
            .filter(|(row, _)| violates(row))
            .map(|(_, key)| self.finding(key))
            .collect()
    }
}

fn resolve(dataset: &Dataset, columns: &[String]) -> Result<Vec<usize>, RuleFailure> {
    dataset
        .resolve_columns(columns)
        .map_err(RuleFailure::MissingColumns)
}

fn resolve_one(dataset: &Dataset, column: &str) -> Result<usize, RuleFailure> {
    dataset
        .column_index(column)
        .ok_or_else(|| RuleFailure::MissingColumns(vec![column.to_string()]))
}

fn as_date(value: &Value, format: &str) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Text(s) => NaiveDate::parse_from_str(s.trim(), format).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DateOrder;
    use crate::rules::EvalLimits;

    fn check(rule: &BuiltInRule, dataset: &Dataset) -> Result<Vec<ValidationFinding>, RuleFailure> {
        let keys = dataset.row_keys(&["PolicyNumber"]);
        let limits = EvalLimits::default();
        rule.check(&RuleContext::new(dataset, &keys, &limits))
    }

    fn flagged(findings: &[ValidationFinding]) -> Vec<String> {
        findings
            .iter()
            .filter_map(|f| f.key.as_ref().map(|k| k.to_string()))
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_fixed_order_and_names() {
        let mut validator = ValidatorSettings::default();
        validator.required_columns = vec!["PolicyNumber".into(), "Gender".into()];
        validator.date_columns = vec!["CoverStartDate".into()];
        validator.gender_values = vec!["M".into(), "F".into()];
        validator.min_premium = Some(Decimal::TEN);
        validator.not_null_columns = vec!["Age".into()];

        let rules = BuiltInRule::from_settings(&["PolicyNumber".to_string()], &validator);
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "required_column.PolicyNumber",
                "required_column.Gender",
                "primary_key_not_null.PolicyNumber",
                "primary_key_unique.PolicyNumber",
                "not_null.Age",
                "date_format.CoverStartDate",
                "allowed_values.Gender",
                "min_value.MonthlyPremium",
            ]
        );
        assert_eq!(rules.last().unwrap().severity, Severity::Warning);
    }

    #[test]
    fn test_required_column_missing() {
        let dataset = Dataset::new(["PolicyNumber"], vec![vec![Value::from("P1")]]).unwrap();
        let rule = BuiltInRule::new(
            BuiltInKind::RequiredColumn {
                column: "Gender".into(),
            },
            Severity::Error,
        );

        let findings = check(&rule, &dataset).unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].key.is_none());
    }

    #[test]
    fn test_primary_key_unique_flags_every_duplicate() {
        let dataset = Dataset::new(
            ["PolicyNumber"],
            vec![
                vec![Value::from("P1")],
                vec![Value::from("P2")],
                vec![Value::from("P1")],
            ],
        )
        .unwrap();
        let rule = BuiltInRule::new(
            BuiltInKind::PrimaryKeyUnique {
                columns: vec!["PolicyNumber".into()],
            },
            Severity::Error,
        );

        assert_eq!(flagged(&check(&rule, &dataset).unwrap()), vec!["P1", "P1"]);
    }

    #[test]
    fn test_primary_key_not_null() {
        let dataset = Dataset::new(
            ["PolicyNumber"],
            vec![vec![Value::from("P1")], vec![Value::Null]],
        )
        .unwrap();
        let rule = BuiltInRule::new(
            BuiltInKind::PrimaryKeyNotNull {
                columns: vec!["PolicyNumber".into()],
            },
            Severity::Error,
        );

        assert_eq!(check(&rule, &dataset).unwrap().len(), 1);
    }

    #[test]
    fn test_date_format() {
        let dataset = Dataset::new(
            ["PolicyNumber", "CoverStartDate"],
            vec![
                vec![Value::from("P1"), date(2024, 1, 1)],
                vec![Value::from("P2"), Value::from("31/01/2024")],
                vec![Value::from("P3"), Value::from("2024-02-30")],
                vec![Value::from("P4"), Value::Null],
            ],
        )
        .unwrap();
        let rule = BuiltInRule::new(
            BuiltInKind::DateFormat {
                column: "CoverStartDate".into(),
                format: "%Y-%m-%d".into(),
            },
            Severity::Error,
        );

        assert_eq!(flagged(&check(&rule, &dataset).unwrap()), vec!["P2", "P3"]);
    }

    #[test]
    fn test_date_order_flags_end_before_start() {
        let dataset = Dataset::new(
            ["PolicyNumber", "Start", "End"],
            vec![
                vec![Value::from("P1"), date(2024, 1, 1), date(2023, 12, 31)],
                vec![Value::from("P2"), date(2024, 1, 1), date(2024, 1, 1)],
                vec![Value::from("P3"), date(2024, 1, 1), Value::Null],
            ],
        )
        .unwrap();
        let validator = ValidatorSettings {
            date_order: vec![DateOrder {
                start: "Start".into(),
                end: "End".into(),
            }],
            ..ValidatorSettings::default()
        };
        let rules = BuiltInRule::from_settings(&[], &validator);
        assert_eq!(rules[0].name, "date_order.Start+End");

        assert_eq!(flagged(&check(&rules[0], &dataset).unwrap()), vec!["P1"]);
    }

    #[test]
    fn test_allowed_values_ignores_null() {
        let dataset = Dataset::new(
            ["PolicyNumber", "Gender"],
            vec![
                vec![Value::from("P1"), Value::from("M")],
                vec![Value::from("P2"), Value::from("X")],
                vec![Value::from("P3"), Value::Null],
            ],
        )
        .unwrap();
        let rule = BuiltInRule::new(
            BuiltInKind::AllowedValues {
                column: "Gender".into(),
                values: vec!["M".into(), "F".into()],
            },
            Severity::Error,
        );

        assert_eq!(flagged(&check(&rule, &dataset).unwrap()), vec!["P2"]);
    }

    #[test]
    fn test_min_value_and_positive() {
        let dataset = Dataset::new(
            ["PolicyNumber", "MonthlyPremium"],
            vec![
                vec![Value::from("P1"), Value::from(4)],
                vec![Value::from("P2"), Value::from(25)],
                vec![Value::from("P3"), Value::from(0)],
            ],
        )
        .unwrap();

        let min = BuiltInRule::new(
            BuiltInKind::MinValue {
                column: "MonthlyPremium".into(),
                min: Decimal::TEN,
            },
            Severity::Warning,
        );
        assert_eq!(flagged(&check(&min, &dataset).unwrap()), vec!["P1", "P3"]);

        let positive = BuiltInRule::new(
            BuiltInKind::Positive {
                column: "MonthlyPremium".into(),
            },
            Severity::Error,
        );
        assert_eq!(flagged(&check(&positive, &dataset).unwrap()), vec!["P3"]);
    }

    #[test]
    fn test_missing_target_column_fails() {
        let dataset = Dataset::new(["PolicyNumber"], vec![vec![Value::from("P1")]]).unwrap();
        let rule = BuiltInRule::new(
            BuiltInKind::NotNull {
                column: "Age".into(),
            },
            Severity::Error,
        );

        assert_eq!(
            check(&rule, &dataset).unwrap_err(),
            RuleFailure::MissingColumns(vec!["Age".to_string()])
        );
    }
}
