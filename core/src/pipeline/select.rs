use crate::executor::TaskOutcome;

use super::plan::PipelinePlan;
use super::stage::StageRecord;

/// Best usable Foundation output: `primary` first, then declared order.
///
/// Only successes with non-blank text qualify. Completion order is never
/// consulted, so reruns with the same successes select the same output.
pub fn best_foundation<'a>(plan: &PipelinePlan, record: &'a StageRecord) -> Option<&'a TaskOutcome> {
    plan.foundation_precedence()
        .filter_map(|name| record.outcome(name))
        .find(|o| usable_text(o).is_some())
}

/// Non-blank text payload of an outcome.
pub fn usable_text(outcome: &TaskOutcome) -> Option<&str> {
    outcome
        .text()
        .filter(|t| !t.trim().is_empty())
}
