//! Remote text-generation capability and the registry that resolves it by name.
//!
//! Concrete adapters (HTTP chat completions, Anthropic, static) live in
//! `forge-plugins`; the pipeline only sees [`Provider`].

mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub use registry::ProviderRegistry;

/// Per-call generation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Ask the provider for a JSON object response.
    #[serde(default)]
    pub json: bool,
}

impl GenerateOptions {
    /// Stable text form used when deriving cache keys.
    pub fn cache_fingerprint(&self) -> String {
        format!(
            "system={}|max_tokens={}|temperature={}|json={}",
            self.system.as_deref().unwrap_or(""),
            self.max_tokens.map(|v| v.to_string()).unwrap_or_default(),
            self.temperature.map(|v| v.to_string()).unwrap_or_default(),
            self.json
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Result of one successful `generate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl Generation {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name (unique per process).
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError>;
}
