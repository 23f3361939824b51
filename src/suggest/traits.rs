use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ColumnType, CustomRuleDef, Dataset, Severity};

/// Errors from a rule suggestion backend.
#[derive(Error, Debug)]
pub enum SuggestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("suggestion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no JSON array found in suggestion response")]
    NoJson,

    #[error("malformed suggestion: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("rule suggestion timed out after {0} ms")]
    Timeout(u64),

    #[error("{0}")]
    Backend(String),
}

/// One column as shown to a suggestion backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSample {
    pub name: String,
    pub column_type: ColumnType,
    /// Canonical text of the first non-null values
    pub samples: Vec<String>,
}

/// Column names, types and sample values of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSample {
    pub columns: Vec<ColumnSample>,
}

impl SchemaSample {
    /// Sample up to `sample_rows` non-null values per column.
    pub fn from_dataset(dataset: &Dataset, sample_rows: usize) -> Self {
        let columns = dataset
            .columns()
            .iter()
            .enumerate()
            .map(|(c, name)| ColumnSample {
                name: name.clone(),
                column_type: dataset.column_types()[c],
                samples: dataset
                    .column_values(c)
                    .filter(|v| !v.is_null())
                    .take(sample_rows)
                    .map(|v| v.canonical())
                    .collect(),
            })
            .collect();

        SchemaSample { columns }
    }
}

/// A rule proposed by a suggestion backend.
///
/// Same shape as a configured custom rule plus its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedRule {
    pub name: String,
    pub func: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub message: Option<String>,
}

impl SuggestedRule {
    pub fn to_def(&self) -> CustomRuleDef {
        CustomRuleDef {
            func: self.func.clone(),
            columns: self.columns.clone(),
            severity: self.severity,
            message: self.message.clone(),
        }
    }
}

/// Source of additional candidate rules.
///
/// Suggested rules are compiled and sandboxed exactly like configured
/// custom rules.
#[async_trait]
pub trait RuleSuggester: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Whether the pipeline should call this suggester at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Propose rules for a snapshot schema.
    async fn suggest_rules(&self, schema: &SchemaSample) -> Result<Vec<SuggestedRule>, SuggestError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;

    #[test]
    fn test_schema_sample() {
        let dataset = Dataset::new(
            ["PolicyNumber", "Gender"],
            vec![
                vec![Value::from("P1"), Value::Null],
                vec![Value::from("P2"), Value::from("F")],
                vec![Value::from("P3"), Value::from("M")],
            ],
        )
        .unwrap();

        let sample = SchemaSample::from_dataset(&dataset, 1);

        assert_eq!(sample.columns.len(), 2);
        assert_eq!(sample.columns[0].samples, vec!["P1".to_string()]);
        assert_eq!(sample.columns[1].samples, vec!["F".to_string()]);
        assert_eq!(sample.columns[1].column_type, ColumnType::Text);
    }

    #[test]
    fn test_suggested_rule_defaults() {
        let rule: SuggestedRule = serde_json::from_str(
            r#"{"name": "premium_positive", "func": "MonthlyPremium <= 0", "columns": ["MonthlyPremium"]}"#,
        )
        .unwrap();

        let def = rule.to_def();
        assert_eq!(def.severity, Severity::Error);
        assert!(def.message.is_none());
    }
}
