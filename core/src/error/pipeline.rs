use std::collections::BTreeMap;

use thiserror::Error;

/// Errors that end a pipeline run without an artifact.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// No Foundation task produced usable base content.
    ///
    /// `failures` maps each attempted foundation task to its error message;
    /// it is empty when no foundation provider was configured at all.
    #[error("no foundation output for run {run_id} ({} task(s) failed)", failures.len())]
    NoFoundationOutput {
        run_id: String,
        failures: BTreeMap<String, String>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A provider output whose shape cannot be merged into its artifact field.
///
/// Never propagated: the merge engine omits the field and records the
/// inconsistency as a warning on the artifact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot merge '{task}' into {field}: {reason}")]
pub struct MergeInconsistency {
    pub task: String,
    pub field: &'static str,
    pub reason: String,
}
