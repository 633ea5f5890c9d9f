//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors raised when a process could not be run to completion.
///
/// A process that ran and exited non-zero is not an error; see
/// [`crate::ExecutionResult::success`].
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to start {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Process execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Process timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid working directory: {0}")]
    InvalidWorkdir(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
