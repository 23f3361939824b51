use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;
use tracing::debug;

use crate::domain::SuggestSettings;

use super::traits::{RuleSuggester, SchemaSample, SuggestError, SuggestedRule};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Asks a local Ollama model to propose validation rules.
pub struct OllamaSuggester {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaSuggester {
    /// Create a new suggester from settings.
    pub fn new(settings: &SuggestSettings) -> Result<Self, SuggestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(OllamaSuggester {
            client,
            base_url: settings
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: settings.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl RuleSuggester for OllamaSuggester {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn suggest_rules(&self, schema: &SchemaSample) -> Result<Vec<SuggestedRule>, SuggestError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(schema),
            stream: false,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SuggestError::Status { status, body });
        }

        let body: GenerateResponse = response.json().await?;
        debug!(model = %self.model, chars = body.response.len(), "Received rule suggestions");

        parse_suggestions(&body.response)
    }
}

/// Prompt describing the schema and the rule language.
pub fn build_prompt(schema: &SchemaSample) -> String {
    let mut prompt = String::from(
        "You are auditing an insurance policy book. Propose data validation rules for the \
         columns below. Respond with a JSON array only, each element shaped as\n\
         {\"name\": \"snake_case_name\", \"func\": \"<expression>\", \"columns\": [\"...\"], \
         \"severity\": \"error\" or \"warning\", \"message\": \"...\"}\n\
         `func` must be true for rows that VIOLATE the rule. It may use column names listed in \
         `columns`, comparisons (== != < <= > >=), and, or, not, in [...], is null, is not null, \
         + - * /, and the functions len, lower, upper, trim, abs, year, date, days_between, \
         matches, coalesce.\n\nColumns:\n",
    );

    for column in &schema.columns {
        let _ = writeln!(
            prompt,
            "- {} ({}): {}",
            column.name,
            column.column_type,
            column.samples.join(", ")
        );
    }

    prompt
}

/// Extract the outermost JSON array from free-form model output.
pub fn parse_suggestions(text: &str) -> Result<Vec<SuggestedRule>, SuggestError> {
    let start = text.find('[').ok_or(SuggestError::NoJson)?;
    let end = text.rfind(']').ok_or(SuggestError::NoJson)?;
    if end < start {
        return Err(SuggestError::NoJson);
    }

    Ok(serde_json::from_str(&text[start..=end])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnType, Severity};
    use crate::suggest::traits::ColumnSample;

    #[test]
    fn test_parse_suggestions_from_chatty_output() {
        let text = r#"Sure! Here are some rules:
[{"name": "premium_floor", "func": "MonthlyPremium < 1", "columns": ["MonthlyPremium"], "severity": "warning"}]
Let me know if you need more."#;

        let rules = parse_suggestions(text).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "premium_floor");
        assert_eq!(rules[0].severity, Severity::Warning);
    }

    #[test]
    fn test_parse_suggestions_without_array() {
        assert!(matches!(parse_suggestions("no rules today"), Err(SuggestError::NoJson)));
        assert!(matches!(parse_suggestions("] backwards ["), Err(SuggestError::NoJson)));
    }

    #[test]
    fn test_parse_suggestions_malformed() {
        assert!(matches!(parse_suggestions("[{\"name\": 1}]"), Err(SuggestError::Parse(_))));
    }

    #[test]
    fn test_prompt_lists_columns() {
        let schema = SchemaSample {
            columns: vec![ColumnSample {
                name: "VehicleColour".to_string(),
                column_type: ColumnType::Text,
                samples: vec!["Red".to_string(), "Blue".to_string()],
            }],
        };

        let prompt = build_prompt(&schema);
        assert!(prompt.contains("- VehicleColour (text): Red, Blue"));
        assert!(prompt.contains("JSON array"));
    }

    #[test]
    fn test_base_url_normalized() {
        let settings = SuggestSettings {
            enabled: true,
            url: Some("http://localhost:11434/".to_string()),
            ..SuggestSettings::default()
        };

        let suggester = OllamaSuggester::new(&settings).unwrap();
        assert_eq!(suggester.base_url, "http://localhost:11434");
        assert_eq!(suggester.model(), "llama3.1");
    }
}
