//! # tfrelay_core
//!
//! Request orchestration for tfrelay.
//!
//! This crate turns terraform requests into outcomes: it normalizes the
//! three script sources into a per-request workspace, resolves the tool
//! version, runs the operation, and delivers or stores the result.
//!
//! # Architecture
//!
//! - **Models**: the request sum type and the outcome, in their wire format
//! - **Workspaces**: one directory per request id, cleaned after use
//! - **Orchestrator**: validation, materialization, execution, assembly
//! - **Delivery**: one callback attempt, durable fallback to the result store
//! - **Dispatcher**: bounded background execution of webhook requests
//! - **Queue**: routing keys and a consumer for the message surface
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tfrelay_core::{ExecutionRequest, RequestService, RequestType, ScriptSource, ServiceConfig};
//! use tfrelay_runner::ProcessRunner;
//!
//! let config = Arc::new(ServiceConfig::default());
//! let runner = Arc::new(ProcessRunner::new());
//! let resolver = Arc::new(config.tool.build_resolver(runner.clone()));
//! let service = RequestService::new(config, runner, resolver);
//!
//! let request = ExecutionRequest::new(
//!     RequestType::Plan,
//!     ScriptSource::Directory("/srv/infra".into()),
//! );
//! let outcome = service.handle(&request).await?;
//! ```

pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod git;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod store;
pub mod workspace;

pub use config::{ServiceConfig, ToolConfig};
pub use delivery::{DeliveryStatus, ResultDelivery};
pub use dispatcher::AsyncDispatcher;
pub use error::{
    CoreError, CoreResult, DeliveryError, DeliveryResult, RetrieveError, StoreError, StoreResult,
};
pub use git::GitFetcher;
pub use models::{
    ExecutionOutcome, ExecutionRequest, GitCredentials, GitRepoDetails, HealthStatus,
    RefetchResult, RefetchState, RequestType, ScriptSource, SystemStatus, WebhookConfig,
};
pub use orchestrator::{request_span, RequestService};
pub use queue::{ChannelPublisher, Envelope, MessagePublisher, QueueConsumer, EXCHANGE};
pub use store::ResultStore;
pub use workspace::{PreparedWorkspace, WorkspaceManager};
