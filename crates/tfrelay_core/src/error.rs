//! Error types for the core module.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while processing a request.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid scripts: {0}")]
    InvalidScripts(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Tool(#[from] tfrelay_tool::ToolError),

    #[error(transparent)]
    Iac(#[from] tfrelay_iac::IacError),

    #[error("Runner error: {0}")]
    Runner(#[from] tfrelay_runner::RunnerError),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for the result store.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures writing or reading persisted outcomes.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Result store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Result serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a persisted outcome could not be returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrieveError {
    #[error("No result found for request {0}")]
    NotFound(Uuid),

    #[error("Request {0} is still in progress")]
    InProgress(Uuid),

    #[error("Stored result for request {id} could not be read: {reason}")]
    ParseFailed { id: Uuid, reason: String },
}

/// Result type alias for callback delivery.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Callback POST failures.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Callback request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Callback {url} answered {status}")]
    Rejected { url: String, status: u16 },
}
