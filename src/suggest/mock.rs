use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use super::traits::{RuleSuggester, SchemaSample, SuggestError, SuggestedRule};

/// Mock suggester for testing.
#[derive(Debug, Default)]
pub struct MockSuggester {
    rules: Mutex<Vec<SuggestedRule>>,
    failure: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    received: Mutex<Vec<SchemaSample>>,
}

impl MockSuggester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suggest these rules on every call.
    pub fn with_rules(rules: Vec<SuggestedRule>) -> Self {
        let mock = Self::default();
        *mock.rules.lock() = rules;
        mock
    }

    /// Fail every call with the given message (for testing).
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Sleep before answering (for timeout tests).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Schemas received so far (for assertions).
    pub fn received(&self) -> Vec<SchemaSample> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl RuleSuggester for MockSuggester {
    fn name(&self) -> &str {
        "mock"
    }

    async fn suggest_rules(&self, schema: &SchemaSample) -> Result<Vec<SuggestedRule>, SuggestError> {
        self.received.lock().push(schema.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure.lock().clone() {
            return Err(SuggestError::Backend(message));
        }

        Ok(self.rules.lock().clone())
    }
}
