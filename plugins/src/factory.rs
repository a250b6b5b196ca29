use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use forge_core::config::{AppConfig, ProviderBackend, ProviderConfig, RetryConfig};
use forge_core::executor::traits::{OutputRendererPlugin, RetryStrategyPlugin};
use forge_core::provider::{Provider, ProviderRegistry};

use crate::executor::{
    ExponentialBackoffPlugin, JsonlRendererPlugin, LinearRetryPlugin, TextRendererPlugin,
};
use crate::provider::{AnthropicProvider, ChatCompletionsProvider, StaticProvider};

pub fn build_retry(cfg: &RetryConfig) -> Arc<dyn RetryStrategyPlugin> {
    match cfg.strategy.as_str() {
        "linear" => Arc::new(LinearRetryPlugin::new(cfg.clone())),
        // Anything else behaves like exponential backoff.
        _ => Arc::new(ExponentialBackoffPlugin::new(cfg.clone())),
    }
}

pub fn build_provider(
    cfg: &ProviderConfig,
    default_timeout: Duration,
    retry: Arc<dyn RetryStrategyPlugin>,
) -> Result<Arc<dyn Provider>> {
    let timeout = cfg
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(default_timeout);
    let provider: Arc<dyn Provider> = match &cfg.backend {
        ProviderBackend::ChatCompletions(http) => Arc::new(
            ChatCompletionsProvider::new(&cfg.name, http, timeout, retry)
                .with_context(|| format!("build provider {}", cfg.name))?,
        ),
        ProviderBackend::Anthropic(http) => Arc::new(
            AnthropicProvider::new(&cfg.name, http, timeout, retry)
                .with_context(|| format!("build provider {}", cfg.name))?,
        ),
        ProviderBackend::Static(s) => Arc::new(StaticProvider::new(&cfg.name, s.content.clone())),
    };
    Ok(provider)
}

/// Registers every configured provider. Fails on the first one that cannot be built.
pub fn build_registry(cfg: &AppConfig) -> Result<ProviderRegistry> {
    let retry = build_retry(&cfg.retry);
    let mut registry = ProviderRegistry::new();
    for p in &cfg.providers {
        registry.register(build_provider(p, cfg.executor.task_timeout(), retry.clone())?);
        tracing::debug!(target: "forge.provider", provider = %p.name, kind = p.backend.kind(), "provider registered");
    }
    Ok(registry)
}

pub fn build_renderer(format: &str, progress: bool) -> Arc<dyn OutputRendererPlugin> {
    match format {
        "jsonl" => Arc::new(JsonlRendererPlugin::new(false)),
        // Preserve existing behavior: anything other than jsonl behaves like text.
        _ => Arc::new(TextRendererPlugin::new(false).with_progress(progress)),
    }
}
