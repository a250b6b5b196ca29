//! Task Executor and stage join.
//!
//! ```text
//! Vec<TaskSpec>
//!   ↓
//! settle_all(max_parallel)         // never fail-fast
//!   ↓ per task
//! TaskExecutor::run(spec, work)    // timeout + timing + error tagging
//!   ↓
//! Result<TaskOutcome, TaskFailure>
//! ```

mod scheduler;
mod task;
pub mod traits;

pub use scheduler::settle_all;
pub use task::{TaskExecutor, TaskOutcome, TaskOutput, TaskSpec};
pub use traits::{NoRetry, OutputRendererPlugin, RenderEvent, RetryStrategyPlugin};
