#[allow(clippy::module_inception)]
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod task;

pub use error::CliError;
pub use pipeline::{MergeInconsistency, PipelineError};
pub use provider::{ProviderError, ProviderErrorKind};
pub use task::{TaskError, TaskFailure};
