use thiserror::Error;

use super::pipeline::PipelineError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// 11: config error, 20: io / command error, 30: no foundation output,
    /// 31: invalid request, 50: internal/uncategorized.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 11,
            Self::Io(_) | Self::Command(_) => 20,
            Self::Pipeline(PipelineError::NoFoundationOutput { .. }) => 30,
            Self::Pipeline(PipelineError::InvalidRequest(_)) => 31,
            Self::Anyhow(_) => 50,
        }
    }
}
