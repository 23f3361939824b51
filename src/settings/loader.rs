use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::domain::AuditSettings;

/// Errors that can occur during settings loading.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load audit settings from a YAML file.
pub fn load_settings(path: impl AsRef<Path>) -> Result<AuditSettings, SettingsError> {
    let content = fs::read_to_string(path)?;
    parse_settings(&content)
}

/// Parse and validate audit settings from YAML text.
pub fn parse_settings(yaml: &str) -> Result<AuditSettings, SettingsError> {
    let settings: AuditSettings = serde_yaml::from_str(yaml)?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// Validate settings values that serde cannot check.
fn validate_settings(settings: &AuditSettings) -> Result<(), SettingsError> {
    if settings.primary_keys.is_empty() {
        return Err(SettingsError::Validation(
            "primary_keys must name at least one column".to_string(),
        ));
    }

    let mut seen_keys = HashSet::new();
    for key in &settings.primary_keys {
        if key.trim().is_empty() {
            return Err(SettingsError::Validation(
                "primary_keys contains an empty column name".to_string(),
            ));
        }
        if !seen_keys.insert(key) {
            return Err(SettingsError::Validation(format!(
                "Duplicate primary key column: {key}"
            )));
        }
    }

    let outlier = &settings.outlier;
    if outlier.percentile_threshold < Decimal::ZERO
        || outlier.percentile_threshold >= Decimal::from(50)
    {
        return Err(SettingsError::Validation(format!(
            "outlier.percentile_threshold must be in [0, 50), got {}",
            outlier.percentile_threshold
        )));
    }
    if outlier.rare_category_threshold < Decimal::ZERO
        || outlier.rare_category_threshold > Decimal::ONE_HUNDRED
    {
        return Err(SettingsError::Validation(format!(
            "outlier.rare_category_threshold must be in [0, 100], got {}",
            outlier.rare_category_threshold
        )));
    }

    let validator = &settings.validator;
    if validator.date_format.is_empty() {
        return Err(SettingsError::Validation(
            "validator.date_format cannot be empty".to_string(),
        ));
    }
    if settings.loader.date_format.is_empty() {
        return Err(SettingsError::Validation(
            "loader.date_format cannot be empty".to_string(),
        ));
    }

    for (name, rule) in &validator.custom_rules {
        if name.trim().is_empty() {
            return Err(SettingsError::Validation(
                "Custom rule name cannot be empty".to_string(),
            ));
        }
        if rule.func.trim().is_empty() {
            return Err(SettingsError::Validation(format!(
                "Custom rule '{name}' has an empty func"
            )));
        }
        if rule.columns.is_empty() {
            return Err(SettingsError::Validation(format!(
                "Custom rule '{name}' must list the columns it reads"
            )));
        }
    }

    let llm = &settings.llm_validator;
    if llm.enabled && llm.url.as_deref().map_or(true, str::is_empty) {
        return Err(SettingsError::Validation(
            "llm_validator.url is required when llm_validator.enabled is set".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_settings() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
primary_keys: [PolicyNumber]
outlier:
  percentile_threshold: 10.0
  rare_category_threshold: 1.0
comparison:
  join_type: outer
validator:
  date_format: "%Y-%m-%d"
  gender_values: [M, F]
  min_premium: 5
  custom_rules:
    age_limit:
      func: "Age > 99"
      columns: [Age]
      severity: warning
      message: "Age above 99"
"#
        )
        .unwrap();

        let settings = load_settings(file.path()).unwrap();

        assert_eq!(settings.primary_keys, vec!["PolicyNumber".to_string()]);
        assert_eq!(settings.validator.gender_values.len(), 2);
        assert_eq!(
            settings.validator.custom_rules["age_limit"].message.as_deref(),
            Some("Age above 99")
        );
    }

    #[test]
    fn test_missing_file() {
        let result = load_settings("/definitely/not/here.yaml");
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }

    #[test]
    fn test_empty_primary_keys() {
        let result = parse_settings("primary_keys: []");
        assert!(result.unwrap_err().to_string().contains("primary_keys"));
    }

    #[test]
    fn test_duplicate_primary_keys() {
        let result = parse_settings("primary_keys: [PolicyNumber, PolicyNumber]");
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_percentile_threshold_range() {
        let result = parse_settings(
            r#"
primary_keys: [PolicyNumber]
outlier:
  percentile_threshold: 50
"#,
        );
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("percentile_threshold"));
    }

    #[test]
    fn test_custom_rule_needs_columns() {
        let result = parse_settings(
            r#"
primary_keys: [PolicyNumber]
validator:
  custom_rules:
    broken:
      func: "Age > 1"
      columns: []
"#,
        );
        assert!(result.unwrap_err().to_string().contains("broken"));
    }

    #[test]
    fn test_suggester_needs_url() {
        let result = parse_settings(
            r#"
primary_keys: [PolicyNumber]
llm_validator:
  enabled: true
"#,
        );
        assert!(result.unwrap_err().to_string().contains("llm_validator.url"));
    }

    #[test]
    fn test_unsupported_join_type() {
        let result = parse_settings(
            r#"
primary_keys: [PolicyNumber]
comparison:
  join_type: semi
"#,
        );
        assert!(matches!(result, Err(SettingsError::Yaml(_))));
    }
}
