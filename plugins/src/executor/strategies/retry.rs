use std::time::Duration;

use forge_core::config::RetryConfig;
use forge_core::error::ProviderError;
use forge_core::executor::traits::RetryStrategyPlugin;

/// Doubles `base_delay_ms` per attempt, capped at `max_delay_ms`.
pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

/// Grows by `base_delay_ms` per attempt, capped at `max_delay_ms`.
pub struct LinearRetryPlugin {
    config: RetryConfig,
}

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

/// Applies `factor(attempt)` to the base delay, or `None` once the budget is spent.
fn scaled(config: &RetryConfig, attempt: u32, factor: u64) -> Option<Duration> {
    if attempt.saturating_add(1) >= config.max_attempts.max(1) {
        return None;
    }
    let ms = config.base_delay_ms.saturating_mul(factor).min(config.max_delay_ms);
    Some(Duration::from_millis(ms))
}

/// Waits at least as long as the provider asked. A request longer than
/// `max_delay_ms` gives up rather than sleeping past the cap.
fn honor_retry_after(
    config: &RetryConfig,
    computed: Option<Duration>,
    error: &ProviderError,
) -> Option<Duration> {
    let computed = computed?;
    match error.retry_after {
        None => Some(computed),
        Some(wait) if wait > Duration::from_millis(config.max_delay_ms) => None,
        Some(wait) => Some(computed.max(wait)),
    }
}

impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        scaled(&self.config, attempt, 1u64 << attempt.min(30))
    }

    fn delay_for(&self, attempt: u32, error: &ProviderError) -> Option<Duration> {
        honor_retry_after(&self.config, self.next_delay(attempt), error)
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        scaled(&self.config, attempt, u64::from(attempt) + 1)
    }

    fn delay_for(&self, attempt: u32, error: &ProviderError) -> Option<Duration> {
        honor_retry_after(&self.config, self.next_delay(attempt), error)
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }
}
