use thiserror::Error;

use crate::types::StepKind;

#[derive(Debug, Error)]
pub enum TextflowError {
    // Input errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Step errors
    /// A step failed during a run. Displays the processor's message verbatim
    /// so callers see exactly what the backend reported.
    #[error("{message}")]
    StepExecution {
        step: StepKind,
        index: usize,
        message: String,
    },

    #[error("{0}")]
    Processor(String),

    #[error("Step processor timed out after {timeout_secs}s: {step}")]
    ProcessorTimeout { step: StepKind, timeout_secs: u64 },

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TextflowError {
    /// Whether this error belongs to the caller-input class (nothing ran).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, TextflowError>;
