use thiserror::Error;

/// Failures raised by the store, matcher and sample log.
///
/// None of these are retryable: the caller has to correct its input.
/// "No match" and "unknown session" are ordinary outcomes and never show up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("name already registered: {0}")]
    DuplicateName(String),
    #[error("descriptor dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("session {0} is closed")]
    SessionClosed(String),
}
