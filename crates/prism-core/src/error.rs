/// Core error types for the Prism orchestrator.
use crate::mode::Mode;

/// A specialized Result type for Prism operations.
pub type PrismResult<T> = Result<T, PrismError>;

/// Top-level error type encompassing all Prism subsystems.
#[derive(Debug, thiserror::Error)]
pub enum PrismError {
    #[error("failed to construct {mode} pipeline: {message}")]
    PipelineConstruction { mode: Mode, message: String },

    #[error("failed to stop {mode} pipeline: {message}")]
    PipelineStop { mode: Mode, message: String },

    #[error("no pipeline is active")]
    NoActivePipeline,

    #[error("gpu error: {0}")]
    Gpu(String),

    #[error("control surface error: {0}")]
    Control(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PrismError {
    /// Create a construction error for the given mode.
    pub fn construction(mode: Mode, message: impl Into<String>) -> Self {
        PrismError::PipelineConstruction {
            mode,
            message: message.into(),
        }
    }

    /// Create a stop error for the given mode.
    pub fn stop(mode: Mode, message: impl Into<String>) -> Self {
        PrismError::PipelineStop {
            mode,
            message: message.into(),
        }
    }

    /// Create a GPU backend error.
    pub fn gpu(message: impl Into<String>) -> Self {
        PrismError::Gpu(message.into())
    }
}
