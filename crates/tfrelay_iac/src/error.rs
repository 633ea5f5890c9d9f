//! Error types for IaC module.

use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur during terraform operations.
///
/// A terraform command that ran and failed is reported through
/// [`crate::RawResult::success`], not here.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Malformed {operation} output: {reason}")]
    MalformedOutput { operation: String, reason: String },

    #[error("Runner error: {0}")]
    Runner(#[from] tfrelay_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IacError {
    pub fn malformed(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedOutput {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}
