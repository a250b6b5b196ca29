use async_trait::async_trait;
use forge_core::error::ProviderError;
use forge_core::provider::{GenerateOptions, Generation, Provider};

/// Returns fixed content for every call. Used for offline runs and demos.
pub struct StaticProvider {
    name: String,
    content: String,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        Ok(Generation::text(self.content.clone()))
    }
}
