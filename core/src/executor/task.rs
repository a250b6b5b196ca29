use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{TaskError, TaskFailure};
use crate::pool::Priority;
use crate::provider::{Generation, Usage};

/// One unit of work within a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Task name, unique within its stage.
    pub name: String,
    /// Producing provider or local utility.
    pub source: String,
    pub priority: Priority,
    /// Overrides the executor's default timeout.
    pub timeout: Option<Duration>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            priority: Priority::NORMAL,
            timeout: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What a task's work returns on success.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub payload: serde_json::Value,
    pub usage: Option<Usage>,
}

impl TaskOutput {
    pub fn json(payload: serde_json::Value) -> Self {
        Self {
            payload,
            usage: None,
        }
    }
}

impl From<Generation> for TaskOutput {
    fn from(g: Generation) -> Self {
        Self {
            payload: serde_json::Value::String(g.content),
            usage: g.usage,
        }
    }
}

/// Successful result of one task. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: String,
    pub source: String,
    /// Raw result: provider text as a JSON string, utility output as JSON.
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
}

impl TaskOutcome {
    /// Payload as text, if the task produced a string.
    pub fn text(&self) -> Option<&str> {
        self.payload.as_str()
    }
}

/// Runs single tasks with a timeout, timing and uniform error capture.
///
/// Performs no retries; retry policy belongs to the work itself.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    default_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Runs `work`, handing it the task's priority for pool admission.
    ///
    /// On timeout the work future is dropped, which releases any pool permit it
    /// holds as a failure.
    pub async fn run<F, Fut>(&self, spec: &TaskSpec, work: F) -> Result<TaskOutcome, TaskFailure>
    where
        F: FnOnce(Priority) -> Fut,
        Fut: Future<Output = Result<TaskOutput, TaskError>>,
    {
        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        let start = Instant::now();
        tracing::debug!(
            target: "forge.executor",
            task = %spec.name,
            source = %spec.source,
            priority = spec.priority.rank(),
            "task start"
        );

        let result = match tokio::time::timeout(timeout, work(spec.priority)).await {
            Ok(r) => r,
            Err(_) => Err(TaskError::TaskTimeout {
                after_ms: timeout.as_millis() as u64,
            }),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                tracing::debug!(
                    target: "forge.executor",
                    task = %spec.name,
                    source = %spec.source,
                    duration_ms,
                    "task ok"
                );
                Ok(TaskOutcome {
                    task: spec.name.clone(),
                    source: spec.source.clone(),
                    payload: output.payload,
                    usage: output.usage,
                    duration_ms,
                    finished_at: Utc::now(),
                    success: true,
                })
            }
            Err(error) => {
                tracing::warn!(
                    target: "forge.executor",
                    task = %spec.name,
                    source = %spec.source,
                    elapsed_ms = duration_ms,
                    kind = error.kind(),
                    error = %error,
                    "task failed"
                );
                Err(TaskFailure {
                    task: spec.name.clone(),
                    source_name: spec.source.clone(),
                    elapsed_ms: duration_ms,
                    error,
                })
            }
        }
    }
}
