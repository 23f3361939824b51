use async_trait::async_trait;

use super::traits::{RuleSuggester, SchemaSample, SuggestError, SuggestedRule};

/// Suggester used when no backend is configured. Never proposes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSuggester;

#[async_trait]
impl RuleSuggester for DisabledSuggester {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn suggest_rules(&self, _schema: &SchemaSample) -> Result<Vec<SuggestedRule>, SuggestError> {
        Ok(Vec::new())
    }
}
