use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl AppConfig {
    /// Rejects values that would make every run fail.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.executor.task_timeout_ms == 0 {
            anyhow::bail!("executor.task_timeout_ms must be greater than 0");
        }
        if self.executor.max_parallel_tasks == 0 {
            anyhow::bail!("executor.max_parallel_tasks must be greater than 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "forge_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Admission limits and breaker tuning for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderLimits {
    pub max_concurrency: usize,
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            failure_threshold: default_failure_threshold(),
            cooldown: Duration::from_millis(default_cooldown_ms()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Breakers whose last failure is older than this are reset by the sweep.
    #[serde(default = "default_stale_breaker_after_ms")]
    pub stale_breaker_after_ms: u64,

    #[serde(default)]
    pub providers: BTreeMap<String, ProviderLimitsOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderLimitsOverride {
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub failure_threshold: Option<u32>,
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
}

fn default_max_concurrency() -> usize {
    2
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_stale_breaker_after_ms() -> u64 {
    24 * 60 * 60 * 1_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            stale_breaker_after_ms: default_stale_breaker_after_ms(),
            providers: BTreeMap::new(),
        }
    }
}

impl PoolConfig {
    /// Effective limits for `provider`, applying any per-provider override.
    pub fn limits_for(&self, provider: &str) -> ProviderLimits {
        let ov = self.providers.get(provider);
        ProviderLimits {
            max_concurrency: ov
                .and_then(|o| o.max_concurrency)
                .unwrap_or(self.max_concurrency)
                .max(1),
            failure_threshold: ov
                .and_then(|o| o.failure_threshold)
                .unwrap_or(self.failure_threshold)
                .max(1),
            cooldown: Duration::from_millis(
                ov.and_then(|o| o.cooldown_ms).unwrap_or(self.cooldown_ms),
            ),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn stale_breaker_after(&self) -> Duration {
        Duration::from_millis(self.stale_breaker_after_ms)
    }
}

/// Operation classes with independently configured cache TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Foundation,
    Enhancement,
    Finalization,
}

impl OperationClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foundation => "foundation",
            Self::Enhancement => "enhancement",
            Self::Finalization => "finalization",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_foundation_ttl_ms")]
    pub foundation_ttl_ms: u64,
    #[serde(default = "default_enhancement_ttl_ms")]
    pub enhancement_ttl_ms: u64,
    #[serde(default = "default_finalization_ttl_ms")]
    pub finalization_ttl_ms: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_foundation_ttl_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_enhancement_ttl_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_finalization_ttl_ms() -> u64 {
    10 * 60 * 1_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            foundation_ttl_ms: default_foundation_ttl_ms(),
            enhancement_ttl_ms: default_enhancement_ttl_ms(),
            finalization_ttl_ms: default_finalization_ttl_ms(),
        }
    }
}

impl CacheConfig {
    /// TTL for an operation class; `None` when caching is disabled.
    pub fn ttl_for(&self, class: OperationClass) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let ms = match class {
            OperationClass::Foundation => self.foundation_ttl_ms,
            OperationClass::Enhancement => self.enhancement_ttl_ms,
            OperationClass::Finalization => self.finalization_ttl_ms,
        };
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,
}

fn default_task_timeout_ms() -> u64 {
    90_000
}

fn default_max_parallel_tasks() -> usize {
    8
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: default_task_timeout_ms(),
            max_parallel_tasks: default_max_parallel_tasks(),
        }
    }
}

impl ExecutorConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub base_delay_ms: u64,
    #[serde(default)]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            max_attempts: 3,
        }
    }
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

/// How an enhancement provider's output is merged into the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementKind {
    /// Output replaces the artifact body.
    Body,
    /// Output is a JSON object merged into the artifact metadata by key.
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancementConfig {
    pub provider: String,
    pub kind: EnhancementKind,
    /// Task name; defaults to the provider name.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Foundation providers in declared precedence order.
    #[serde(default = "default_foundation")]
    pub foundation: Vec<String>,

    /// Preferred foundation provider, consulted before declared order.
    #[serde(default)]
    pub primary: Option<String>,

    /// Enhancement tasks in declared precedence order (lowest first).
    #[serde(default)]
    pub enhancement: Vec<EnhancementConfig>,

    /// Provider that writes the finalization metadata block.
    #[serde(default)]
    pub meta_provider: Option<String>,
}

fn default_foundation() -> Vec<String> {
    vec!["anthropic".to_string(), "openai".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            foundation: default_foundation(),
            primary: None,
            enhancement: Vec::new(),
            meta_provider: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    /// Per-request HTTP timeout; the executor's task timeout still applies.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(flatten)]
    pub backend: ProviderBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProviderBackend {
    #[serde(rename = "chat_completions")]
    ChatCompletions(HttpProviderConfig),
    #[serde(rename = "anthropic")]
    Anthropic(HttpProviderConfig),
    #[serde(rename = "static")]
    Static(StaticProviderConfig),
}

impl ProviderBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatCompletions(_) => "chat_completions",
            Self::Anthropic(_) => "anthropic",
            Self::Static(_) => "static",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    4_096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticProviderConfig {
    pub content: String,
}
