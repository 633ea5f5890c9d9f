//! The [`ToolRunner`] seam and its result type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CommandSpec, RunConfig};
use crate::error::RunnerResult;

/// A process that ran to completion, whatever its exit code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Command line as logged, `-var` values elided
    pub command: String,
    /// -1 when the process was killed by a signal
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty streams joined by a newline, stdout first.
    pub fn combined_output(&self) -> String {
        [self.stdout.as_str(), self.stderr.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs external tools.
///
/// Implementations return `Ok` for every process that ran, whatever its exit
/// code, and `Err` only when the process could not be started or did not
/// finish within the configured timeout.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run a command and capture its output.
    async fn run(&self, command: &CommandSpec, run_config: &RunConfig)
        -> RunnerResult<ExecutionResult>;
}
