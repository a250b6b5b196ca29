//! Merge/Synthesis Engine.
//!
//! Combines completed stage records into one [`Artifact`] without calling any
//! provider. The result depends only on which tasks succeeded and on the
//! declared precedence, never on completion order:
//!
//! - body: the selected Foundation output, then each Enhancement `body`
//!   success in declared order (later overrides earlier);
//! - metadata: each Enhancement `metadata` success merged in by key, in
//!   declared order;
//! - Finalization outputs attach to their own field by task name.
//!
//! Outputs whose shape does not fit their field are dropped with a
//! [`MergeInconsistency`] warning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::EnhancementKind;
use crate::error::MergeInconsistency;
use crate::executor::TaskOutcome;
use crate::pipeline::{
    select, PipelinePlan, StageKind, StageRecord, COMPLIANCE_TASK, META_BLOCK_TASK,
    STRUCTURED_DATA_TASK,
};
use crate::utility::compliance::{ComplianceCheck, ComplianceReport};
use crate::utility::json::{extract_object, type_name};

/// Final merged output of a run. Every field is always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub body: String,
    pub metadata: Map<String, Value>,
    pub structured_data: Map<String, Value>,
    pub compliance_score: Option<f64>,
    pub compliance_checks: Vec<ComplianceCheck>,
    pub meta: Map<String, Value>,
    /// Contributing task names per stage, in precedence order.
    pub contributors: BTreeMap<String, Vec<String>>,
    pub warnings: Vec<String>,
}

impl Artifact {
    fn contribute(&mut self, stage: StageKind, task: &str) {
        self.contributors
            .entry(stage.as_str().to_string())
            .or_default()
            .push(task.to_string());
    }

    fn inconsistency(&mut self, task: &str, field: &'static str, reason: impl Into<String>) {
        let inc = MergeInconsistency {
            task: task.to_string(),
            field,
            reason: reason.into(),
        };
        tracing::warn!(
            target: "forge.merge",
            task = %inc.task,
            field = inc.field,
            reason = %inc.reason,
            "merge inconsistency; field omitted"
        );
        self.warnings.push(inc.to_string());
    }
}

/// Builds the artifact from completed stage records.
///
/// Returns `None` when there is no usable Foundation output. Stages that are
/// missing or not completed contribute nothing.
pub fn synthesize(plan: &PipelinePlan, stages: &[StageRecord]) -> Option<Artifact> {
    let completed = |kind: StageKind| stages.iter().find(|r| r.stage() == kind && r.is_completed());

    let foundation = completed(StageKind::Foundation)?;
    let base = select::best_foundation(plan, foundation)?;

    let mut artifact = Artifact {
        body: select::usable_text(base).unwrap_or_default().to_string(),
        ..Artifact::default()
    };
    artifact.contribute(StageKind::Foundation, &base.task);
    artifact.contributors.insert(StageKind::Enhancement.as_str().to_string(), Vec::new());
    artifact.contributors.insert(StageKind::Finalization.as_str().to_string(), Vec::new());

    if let Some(record) = completed(StageKind::Enhancement) {
        for task in plan.enhancement() {
            let Some(outcome) = record.outcome(&task.name) else {
                continue;
            };
            let applied = match task.kind {
                EnhancementKind::Body => apply_body(&mut artifact, outcome),
                EnhancementKind::Metadata => apply_metadata(&mut artifact, outcome),
            };
            if applied {
                artifact.contribute(StageKind::Enhancement, &task.name);
            }
        }
    }

    if let Some(record) = completed(StageKind::Finalization) {
        for (name, outcome) in record.outcomes() {
            let applied = match name.as_str() {
                STRUCTURED_DATA_TASK => apply_structured_data(&mut artifact, outcome),
                COMPLIANCE_TASK => apply_compliance(&mut artifact, outcome),
                META_BLOCK_TASK => apply_meta(&mut artifact, outcome),
                _ => {
                    artifact.inconsistency(name, "artifact", "no field for finalization task");
                    false
                }
            };
            if applied {
                artifact.contribute(StageKind::Finalization, name);
            }
        }
    }

    tracing::debug!(
        target: "forge.merge",
        body_len = artifact.body.len(),
        metadata_keys = artifact.metadata.len(),
        warnings = artifact.warnings.len(),
        "artifact synthesized"
    );
    Some(artifact)
}

fn apply_body(artifact: &mut Artifact, outcome: &TaskOutcome) -> bool {
    match select::usable_text(outcome) {
        Some(text) => {
            artifact.body = text.to_string();
            true
        }
        None => {
            let reason = match &outcome.payload {
                Value::String(_) => "empty text".to_string(),
                other => format!("expected text, got {}", type_name(other)),
            };
            artifact.inconsistency(&outcome.task, "body", reason);
            false
        }
    }
}

fn object_payload(outcome: &TaskOutcome) -> Result<Map<String, Value>, String> {
    match &outcome.payload {
        Value::Object(map) => Ok(map.clone()),
        Value::String(text) => extract_object(text),
        other => Err(format!("expected JSON object, got {}", type_name(other))),
    }
}

fn apply_metadata(artifact: &mut Artifact, outcome: &TaskOutcome) -> bool {
    match object_payload(outcome) {
        Ok(map) => {
            artifact.metadata.extend(map);
            true
        }
        Err(reason) => {
            artifact.inconsistency(&outcome.task, "metadata", reason);
            false
        }
    }
}

fn apply_structured_data(artifact: &mut Artifact, outcome: &TaskOutcome) -> bool {
    match object_payload(outcome) {
        Ok(map) => {
            artifact.structured_data = map;
            true
        }
        Err(reason) => {
            artifact.inconsistency(&outcome.task, "structured_data", reason);
            false
        }
    }
}

fn apply_compliance(artifact: &mut Artifact, outcome: &TaskOutcome) -> bool {
    match serde_json::from_value::<ComplianceReport>(outcome.payload.clone()) {
        Ok(report) if (0.0..=100.0).contains(&report.score) => {
            artifact.compliance_score = Some(report.score);
            artifact.compliance_checks = report.checks;
            true
        }
        Ok(report) => {
            artifact.inconsistency(
                &outcome.task,
                "compliance_score",
                format!("score {} out of range", report.score),
            );
            false
        }
        Err(e) => {
            artifact.inconsistency(&outcome.task, "compliance_score", e.to_string());
            false
        }
    }
}

fn apply_meta(artifact: &mut Artifact, outcome: &TaskOutcome) -> bool {
    match object_payload(outcome) {
        Ok(map) => {
            artifact.meta = map;
            true
        }
        Err(reason) => {
            artifact.inconsistency(&outcome.task, "meta", reason);
            false
        }
    }
}
