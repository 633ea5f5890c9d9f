//! # tfrelay_runner
//!
//! Subprocess execution wrapper for tfrelay.
//!
//! Every external tool invocation (terraform and git) goes through the
//! [`ToolRunner`] trait so the layers above can be tested without the real
//! binaries installed.
//!
//! # Features
//!
//! - **Process Runner**: spawns the tool with a working directory and merged
//!   environment, captures both streams fully, enforces an optional timeout
//! - **Raw vs. transport failures**: a non-zero exit is data
//!   ([`ExecutionResult::success`]), a process that cannot run is a
//!   [`RunnerError`]
//! - **Mock Runner**: scripted responses and captured calls for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use tfrelay_runner::{CommandSpec, ProcessRunner, RunConfig, ToolRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::new();
//!
//!     let command = CommandSpec::new("terraform")
//!         .args(["version", "-json"])
//!         .workdir("/tmp");
//!
//!     let result = runner.run(&command, &RunConfig::default().timeout(30)).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;

pub use config::{CommandSpec, RunConfig};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use process::{LogStream, ProcessRunner};
pub use runner::{ExecutionResult, ToolRunner};
