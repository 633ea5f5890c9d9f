//! Error types for tool resolution.

use thiserror::Error;

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors that can occur while resolving or installing the tool.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid version constraint '{0}', expected e.g. '>= 1.6.0'")]
    InvalidConstraint(String),

    #[error("No terraform executable satisfies '{constraint}': {reason}")]
    NotFound { constraint: String, reason: String },

    #[error("Failed to fetch available versions: {0}")]
    Fetch(String),

    #[error("Failed to install terraform {version}: {reason}")]
    Install { version: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
