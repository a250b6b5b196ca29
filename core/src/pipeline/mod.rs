//! Stage Pipeline Controller.
//!
//! ```text
//! run_pipeline(request)
//!   ↓ validate
//! Foundation   (fatal if no usable output)
//!   ↓ best output by declared precedence
//! Enhancement  (prompts built from the base body)
//!   ↓ draft = merge(Foundation, Enhancement)
//! Finalization (structured_data, compliance, meta_block)
//!   ↓
//! merge::synthesize -> PipelineRun { stages, artifact }
//! ```

mod controller;
mod plan;
pub mod prompts;
pub mod select;
mod stage;

pub use controller::PipelineController;
pub use plan::{
    EnhancementTask, PipelinePlan, COMPLIANCE_TASK, LOCAL_SOURCE, META_BLOCK_TASK,
    STRUCTURED_DATA_TASK,
};
pub use stage::{PipelineRun, StageKind, StageRecord, StageStatus};
