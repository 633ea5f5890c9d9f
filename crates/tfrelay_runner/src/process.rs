//! Local process runner.
//!
//! Spawns the tool as a child process, captures stdout and stderr fully and
//! enforces the configured timeout by killing the child.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::{CommandSpec, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ExecutionResult, ToolRunner};

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Runner that executes commands as local child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(command: &CommandSpec) -> RunnerResult<Command> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &command.workdir {
            if !dir.is_dir() {
                return Err(RunnerError::InvalidWorkdir(dir.display().to_string()));
            }
            cmd.current_dir(dir);
        }

        Ok(cmd)
    }

    /// Execute a command and capture output, optionally streaming lines to the log.
    async fn execute(
        &self,
        command: &CommandSpec,
        run_config: &RunConfig,
    ) -> RunnerResult<(i64, String, String)> {
        let mut child = Self::build_command(command)?
            .spawn()
            .map_err(|e| RunnerError::SpawnFailed {
                program: command.program.clone(),
                reason: e.to_string(),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stderr was not captured".to_string()))?;

        let stdout_handle = tokio::spawn(collect(stdout, LogStream::Stdout, run_config.stream_logs));
        let stderr_handle = tokio::spawn(collect(stderr, LogStream::Stderr, run_config.stream_logs));

        let status = if run_config.timeout_seconds > 0 {
            let timeout = Duration::from_secs(run_config.timeout_seconds);
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(status) => status.map_err(|e| {
                    RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
                })?,
                Err(_) => {
                    warn!(
                        "{} exceeded {}s, terminating",
                        command.program, run_config.timeout_seconds
                    );
                    if let Err(e) = child.kill().await {
                        error!("Failed to kill timed out process: {}", e);
                    }
                    stdout_handle.abort();
                    stderr_handle.abort();
                    return Err(RunnerError::Timeout(run_config.timeout_seconds));
                }
            }
        } else {
            child.wait().await.map_err(|e| {
                RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?
        };

        let stdout_output = stdout_handle.await.unwrap_or_default();
        let stderr_output = stderr_handle.await.unwrap_or_default();

        let exit_code = status.code().unwrap_or(-1) as i64;

        Ok((exit_code, stdout_output, stderr_output))
    }
}

async fn collect<R>(reader: R, stream: LogStream, stream_logs: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    if !stream_logs {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            warn!("Failed reading {}: {}", stream, e);
        }
        return String::from_utf8_lossy(&buf).into_owned();
    }

    let mut output = String::new();
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(stream = %stream, "{}", line);
                output.push_str(&line);
                output.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed reading {}: {}", stream, e);
                break;
            }
        }
    }
    output
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        let cmd_str = command.display();
        debug!("Executing: {}", cmd_str);

        let started_at = Utc::now();
        let (exit_code, stdout, stderr) = self.execute(command, run_config).await?;
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        if exit_code == 0 {
            info!("{} completed in {}ms", cmd_str, duration_ms);
        } else {
            warn!(
                "{} exited with code {} after {}ms",
                cmd_str, exit_code, duration_ms
            );
        }

        Ok(ExecutionResult {
            command: cmd_str,
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}
