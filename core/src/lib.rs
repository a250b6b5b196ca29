pub mod config;
pub mod error;
pub mod executor;
pub mod merge;
pub mod pipeline;
pub mod pool;
pub mod provider;
pub mod request;
pub mod utility;

pub use error::{PipelineError, ProviderError, TaskError};
pub use merge::Artifact;
pub use pipeline::{PipelineController, PipelineRun};
pub use pool::ProviderPool;
pub use provider::{Provider, ProviderRegistry};
pub use request::Request;
