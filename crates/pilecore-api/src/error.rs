//! Error types for response decoding.

use pilecore_core::{CoreError, ValidationError};

use crate::task::TaskState;

/// Errors produced while decoding service responses.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{context}: column '{column}' has {found} values, expected {expected}")]
    ColumnLength {
        context: String,
        column: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("sub-group {group}: unknown CPT '{cpt}'")]
    UnknownCpt { group: usize, cpt: String },

    #[error("sub-group {group}: CPT '{cpt}' has no bearing result at pile tip level {level}")]
    LevelMismatch { group: usize, cpt: String, level: f64 },

    #[error("task has not finished (state {0})")]
    TaskNotFinished(TaskState),

    #[error("task failed: {reason}")]
    TaskFailed { reason: String },

    #[error("task succeeded without a result")]
    MissingResult,

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl From<ValidationError> for DecodeError {
    fn from(err: ValidationError) -> Self {
        DecodeError::Core(err.into())
    }
}

/// Result type for decoding operations.
pub type Result<T> = std::result::Result<T, DecodeError>;
