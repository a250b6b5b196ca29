use std::time::Duration;

use crate::error::ProviderError;

/// Backoff policy for a single provider call.
///
/// Used inside provider adapters only; the executor and pool never retry.
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Delay before retry number `attempt + 1` (`attempt` is 0-based), or `None` to stop.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Delay before retrying after `error`. Defaults to [`Self::next_delay`];
    /// strategies may stretch it to honor the provider's `retry_after`.
    fn delay_for(&self, attempt: u32, error: &ProviderError) -> Option<Duration> {
        let _ = error;
        self.next_delay(attempt)
    }

    /// Total attempts including the first call.
    fn max_attempts(&self) -> u32;

    fn should_retry(&self, attempt: u32, error: &ProviderError) -> bool {
        attempt < self.max_attempts() && !self.is_fatal_error(error)
    }

    fn is_fatal_error(&self, error: &ProviderError) -> bool {
        !error.is_transient()
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategyPlugin for NoRetry {
    fn name(&self) -> &str {
        "none"
    }

    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn max_attempts(&self) -> u32 {
        1
    }
}
