use thiserror::Error;

use super::provider::ProviderError;

/// Why a single task did not produce an outcome.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The provider's breaker is open (or a half-open probe is already in flight).
    #[error("provider unavailable: {provider}")]
    ProviderUnavailable { provider: String },

    #[error("task timed out after {after_ms}ms")]
    TaskTimeout { after_ms: u64 },

    #[error("transport failure from {provider}: {source}")]
    TaskTransportFailure {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("utility failed: {message}")]
    Utility { message: String },
}

impl TaskError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::TaskTimeout { .. } => "task_timeout",
            Self::TaskTransportFailure { .. } => "transport_failure",
            Self::Utility { .. } => "utility",
        }
    }
}

/// A [`TaskError`] attributed to the task that raised it.
#[derive(Error, Debug, Clone)]
#[error("task '{task}' ({source_name}) failed after {elapsed_ms}ms: {error}")]
pub struct TaskFailure {
    pub task: String,
    pub source_name: String,
    pub elapsed_ms: u64,
    pub error: TaskError,
}
