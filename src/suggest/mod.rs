pub mod disabled;
pub mod mock;
pub mod ollama;
pub mod traits;

pub use disabled::DisabledSuggester;
pub use mock::MockSuggester;
pub use ollama::OllamaSuggester;
pub use traits::{ColumnSample, RuleSuggester, SchemaSample, SuggestError, SuggestedRule};

use std::sync::Arc;

use crate::domain::SuggestSettings;

/// Build the suggester selected by settings.
pub fn from_settings(settings: &SuggestSettings) -> Result<Arc<dyn RuleSuggester>, SuggestError> {
    if settings.enabled {
        Ok(Arc::new(OllamaSuggester::new(settings)?))
    } else {
        Ok(Arc::new(DisabledSuggester))
    }
}
