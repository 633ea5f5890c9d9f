//! # tfrelay_iac
//!
//! Typed terraform operations on top of [`tfrelay_runner`].
//!
//! ## Features
//!
//! - `init` on demand, then one subcommand per operation
//! - Variables passed as `-var` arguments, environment merged into the process
//! - Raw results for tool-level failures, [`IacError`] for runner failures
//! - Parsing of `validate -json` diagnostics
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use tfrelay_iac::{TerraformExecutor, TerraformTarget};
//! use tfrelay_runner::ProcessRunner;
//!
//! # async fn demo() -> Result<(), tfrelay_iac::IacError> {
//! let executor = TerraformExecutor::new(Arc::new(ProcessRunner::new()));
//! let target = TerraformTarget::new("terraform", "/tmp/workspace");
//!
//! let result = executor.plan(&target, &HashMap::new()).await?;
//! println!("success: {}", result.success);
//! # Ok(())
//! # }
//! ```

pub mod diagnostics;
pub mod error;
pub mod terraform;

pub use diagnostics::{Diagnostic, Severity, ValidationReport};
pub use error::{IacError, IacResult};
pub use terraform::{
    Operation, PlanJson, RawResult, TerraformExecutor, TerraformTarget, Variables, PLAN_FILE,
};
