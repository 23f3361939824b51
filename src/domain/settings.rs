use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::comparison::JoinType;
use super::severity::Severity;
use super::value::ISO_DATE;

/// Audit configuration: key columns, rule parameters and thresholds.
///
/// Loaded once per run and passed by reference into each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Ordered columns forming the primary key
    pub primary_keys: Vec<String>,

    #[serde(default)]
    pub loader: LoaderSettings,

    #[serde(default)]
    pub outlier: OutlierSettings,

    #[serde(default)]
    pub comparison: ComparisonSettings,

    #[serde(default)]
    pub validator: ValidatorSettings,

    /// Optional rule suggestion endpoint
    #[serde(default)]
    pub llm_validator: SuggestSettings,
}

impl AuditSettings {
    /// Settings with defaults for everything but the primary key.
    pub fn with_primary_keys<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        AuditSettings {
            primary_keys: keys.into_iter().map(Into::into).collect(),
            loader: LoaderSettings::default(),
            outlier: OutlierSettings::default(),
            comparison: ComparisonSettings::default(),
            validator: ValidatorSettings::default(),
            llm_validator: SuggestSettings::default(),
        }
    }
}

/// Text encoding of snapshot files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    #[default]
    #[serde(alias = "utf8")]
    Utf8,
    #[serde(alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSettings {
    #[serde(default)]
    pub encoding: Encoding,

    /// chrono format used to recognise date cells
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        LoaderSettings {
            encoding: Encoding::Utf8,
            date_format: default_date_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierSettings {
    /// Lower tail percentile; the upper tail is `100 - threshold`
    #[serde(default = "default_percentile_threshold")]
    pub percentile_threshold: Decimal,

    /// Categories below this share of non-null rows (percent) are rare
    #[serde(default = "default_rare_category_threshold")]
    pub rare_category_threshold: Decimal,

    /// Text columns with more distinct values are not treated as categorical
    #[serde(default = "default_max_categories")]
    pub max_categories: usize,

    /// Analyse date columns as day numbers
    #[serde(default = "default_true")]
    pub include_dates: bool,
}

impl Default for OutlierSettings {
    fn default() -> Self {
        OutlierSettings {
            percentile_threshold: default_percentile_threshold(),
            rare_category_threshold: default_rare_category_threshold(),
            max_categories: default_max_categories(),
            include_dates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSettings {
    #[serde(default)]
    pub join_type: JoinType,

    /// Diff shared columns of retained policies
    #[serde(default = "default_true")]
    pub track_changes: bool,
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        ComparisonSettings {
            join_type: JoinType::Outer,
            track_changes: true,
        }
    }
}

/// A pair of date columns where `end` must not precede `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOrder {
    pub start: String,
    pub end: String,
}

/// A user-supplied rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRuleDef {
    /// Predicate selecting the violating rows
    pub func: String,

    /// Columns the predicate may reference
    pub columns: Vec<String>,

    #[serde(default)]
    pub severity: Severity,

    /// Defaults to the rule name
    #[serde(default)]
    pub message: Option<String>,
}

/// Built-in rule parameters plus custom rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSettings {
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Columns whose values must conform to `date_format`
    #[serde(default)]
    pub date_columns: Vec<String>,

    /// Columns that must be declared, in addition to the primary key
    #[serde(default)]
    pub required_columns: Vec<String>,

    #[serde(default)]
    pub not_null_columns: Vec<String>,

    #[serde(default)]
    pub date_order: Vec<DateOrder>,

    #[serde(default = "default_gender_column")]
    pub gender_column: String,

    /// Enumerated gender domain; no check when empty
    #[serde(default)]
    pub gender_values: Vec<String>,

    /// Further categorical domains, column to permitted values
    #[serde(default)]
    pub allowed_values: BTreeMap<String, Vec<String>>,

    /// Columns that must be strictly positive
    #[serde(default)]
    pub positive_columns: Vec<String>,

    #[serde(default = "default_premium_column")]
    pub premium_column: String,

    /// Premium floor; no check when unset
    #[serde(default)]
    pub min_premium: Option<Decimal>,

    /// Further numeric floors, column to minimum
    #[serde(default)]
    pub min_values: BTreeMap<String, Decimal>,

    /// Custom rules by name, in configuration order
    #[serde(default)]
    pub custom_rules: IndexMap<String, CustomRuleDef>,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        ValidatorSettings {
            date_format: default_date_format(),
            date_columns: Vec::new(),
            required_columns: Vec::new(),
            not_null_columns: Vec::new(),
            date_order: Vec::new(),
            gender_column: default_gender_column(),
            gender_values: Vec::new(),
            allowed_values: BTreeMap::new(),
            positive_columns: Vec::new(),
            premium_column: default_premium_column(),
            min_premium: None,
            min_values: BTreeMap::new(),
            custom_rules: IndexMap::new(),
        }
    }
}

/// Rule suggestion endpoint parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the inference server
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_suggest_timeout_secs")]
    pub timeout_secs: u64,

    /// Sample values sent per column
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

impl Default for SuggestSettings {
    fn default() -> Self {
        SuggestSettings {
            enabled: false,
            url: None,
            model: default_model(),
            timeout_secs: default_suggest_timeout_secs(),
            sample_rows: default_sample_rows(),
        }
    }
}

fn default_date_format() -> String {
    ISO_DATE.to_string()
}

fn default_percentile_threshold() -> Decimal {
    Decimal::TEN
}

fn default_rare_category_threshold() -> Decimal {
    Decimal::ONE
}

fn default_max_categories() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_gender_column() -> String {
    "Gender".to_string()
}

fn default_premium_column() -> String {
    "MonthlyPremium".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_suggest_timeout_secs() -> u64 {
    30
}

fn default_sample_rows() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_deserialization() {
        let yaml = r#"
primary_keys: [PolicyNumber]
outlier:
  percentile_threshold: 5
  rare_category_threshold: 2.5
comparison:
  join_type: inner
validator:
  date_format: "%d/%m/%Y"
  date_columns: [CoverStartDate]
  gender_values: [M, F]
  min_premium: 10
  custom_rules:
    zeta:
      func: "Age > 99"
      columns: [Age]
      severity: warning
    alpha:
      func: "SumInsured < MonthlyPremium"
      columns: [SumInsured, MonthlyPremium]
"#;

        let settings: AuditSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.primary_keys, vec!["PolicyNumber".to_string()]);
        assert_eq!(settings.outlier.percentile_threshold, Decimal::new(5, 0));
        assert_eq!(settings.outlier.rare_category_threshold, Decimal::new(25, 1));
        assert_eq!(settings.comparison.join_type, JoinType::Inner);
        assert!(settings.comparison.track_changes);
        assert_eq!(settings.validator.gender_column, "Gender");
        assert_eq!(settings.validator.min_premium, Some(Decimal::TEN));

        // Configuration order is preserved
        let names: Vec<&String> = settings.validator.custom_rules.keys().collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(settings.validator.custom_rules["zeta"].severity, Severity::Warning);
        assert_eq!(settings.validator.custom_rules["alpha"].severity, Severity::Error);
    }

    #[test]
    fn test_defaults() {
        let settings = AuditSettings::with_primary_keys(["PolicyNumber"]);
        assert_eq!(settings.outlier.percentile_threshold, Decimal::TEN);
        assert_eq!(settings.outlier.rare_category_threshold, Decimal::ONE);
        assert_eq!(settings.comparison.join_type, JoinType::Outer);
        assert_eq!(settings.validator.date_format, "%Y-%m-%d");
        assert!(!settings.llm_validator.enabled);
    }

    #[test]
    fn test_unknown_join_type_rejected() {
        let yaml = r#"
primary_keys: [PolicyNumber]
comparison:
  join_type: cross
"#;
        assert!(serde_yaml::from_str::<AuditSettings>(yaml).is_err());
    }
}
