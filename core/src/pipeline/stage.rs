use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::config::OperationClass;
use crate::error::TaskFailure;
use crate::executor::TaskOutcome;
use crate::merge::Artifact;
use crate::request::Request;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Foundation,
    Enhancement,
    Finalization,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [Self::Foundation, Self::Enhancement, Self::Finalization];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foundation => "foundation",
            Self::Enhancement => "enhancement",
            Self::Finalization => "finalization",
        }
    }

    /// Whether the run aborts when this stage yields no successful output.
    pub fn requires_output(self) -> bool {
        matches!(self, Self::Foundation)
    }

    pub fn operation_class(self) -> OperationClass {
        match self {
            Self::Foundation => OperationClass::Foundation,
            Self::Enhancement => OperationClass::Enhancement,
            Self::Finalization => OperationClass::Finalization,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward-only: `Pending -> Running -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
}

/// Outcomes and captured errors of one stage, keyed by task name.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    stage: StageKind,
    status: StageStatus,
    outcomes: BTreeMap<String, TaskOutcome>,
    #[serde(serialize_with = "serialize_failures")]
    errors: BTreeMap<String, TaskFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            outcomes: BTreeMap::new(),
            errors: BTreeMap::new(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    pub fn outcomes(&self) -> &BTreeMap<String, TaskOutcome> {
        &self.outcomes
    }

    pub fn errors(&self) -> &BTreeMap<String, TaskFailure> {
        &self.errors
    }

    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes.get(task)
    }

    pub fn is_completed(&self) -> bool {
        self.status == StageStatus::Completed
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn mark_running(&mut self) {
        if self.advance(StageStatus::Running) {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&mut self) {
        if self.advance(StageStatus::Completed) {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Records a settled task. Only accepted while running; a task name is
    /// recorded once.
    pub fn record(&mut self, result: Result<TaskOutcome, TaskFailure>) {
        if self.status != StageStatus::Running {
            tracing::warn!(
                target: "forge.pipeline",
                stage = %self.stage,
                status = ?self.status,
                "task result ignored: stage not running"
            );
            return;
        }
        let name = match &result {
            Ok(o) => &o.task,
            Err(f) => &f.task,
        };
        if self.outcomes.contains_key(name) || self.errors.contains_key(name) {
            tracing::warn!(target: "forge.pipeline", stage = %self.stage, task = %name, "duplicate task result ignored");
            return;
        }
        match result {
            Ok(outcome) => {
                self.outcomes.insert(outcome.task.clone(), outcome);
            }
            Err(failure) => {
                self.errors.insert(failure.task.clone(), failure);
            }
        }
    }

    fn advance(&mut self, to: StageStatus) -> bool {
        if to <= self.status {
            return false;
        }
        self.status = to;
        true
    }
}

fn serialize_failures<S: Serializer>(
    errors: &BTreeMap<String, TaskFailure>,
    s: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct FailureView<'a> {
        source: &'a str,
        kind: &'static str,
        message: String,
        elapsed_ms: u64,
    }

    s.collect_map(errors.iter().map(|(name, f)| {
        (
            name,
            FailureView {
                source: &f.source_name,
                kind: f.error.kind(),
                message: f.error.to_string(),
                elapsed_ms: f.elapsed_ms,
            },
        )
    }))
}

/// One pipeline execution. Owned by the controller until returned.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub request: Request,
    pub stages: Vec<StageRecord>,
    pub artifact: Option<Artifact>,
    pub duration_ms: u64,
}

impl PipelineRun {
    pub fn new(request: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            request,
            stages: Vec::with_capacity(StageKind::ALL.len()),
            artifact: None,
            duration_ms: 0,
        }
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == kind)
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }
}
