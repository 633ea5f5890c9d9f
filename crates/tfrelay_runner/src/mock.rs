//! Scripted [`ToolRunner`] for tests.
//!
//! Nothing is spawned. Each call is recorded and answered from canned
//! responses, optionally leaving files behind in the working directory the
//! way terraform leaves state and plan files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::config::{CommandSpec, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ExecutionResult, ToolRunner};

/// Canned answer to one call.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Files written into the working directory when this response is served.
    pub files: Vec<(String, String)>,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
            files: Vec::new(),
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
            files: Vec::new(),
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    /// Emulate an artifact produced by the tool.
    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.push((name.into(), content.into()));
        self
    }
}

/// A call as the runner saw it.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
}

impl CapturedCall {
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }
}

/// What a [`MockRunner`] has been told and what it has seen.
#[derive(Default)]
struct MockState {
    scripted: Vec<MockResponse>,
    next_scripted: usize,
    keyed: HashMap<String, MockResponse>,
    calls: Vec<CapturedCall>,
    spawn_error: Option<String>,
    timeout_after: Option<u64>,
}

impl MockState {
    /// Keyed responses win; scripted ones cycle; otherwise an empty success.
    fn pick(&mut self, command: &CommandSpec) -> MockResponse {
        if let Some(keyed) = command.subcommand().and_then(|sub| self.keyed.get(sub)) {
            return keyed.clone();
        }
        if self.scripted.is_empty() {
            return MockResponse::success("");
        }
        let picked = self.scripted[self.next_scripted % self.scripted.len()].clone();
        self.next_scripted += 1;
        picked
    }
}

/// Stand-in for terraform and git in tests.
///
/// Clones share state, so a test can keep one handle for inspection and
/// give another to the code under test.
#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response; queued responses are served in a cycle.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.state.lock().scripted.push(response);
        self
    }

    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        {
            let mut state = self.state.lock();
            state.scripted = responses;
            state.next_scripted = 0;
        }
        self
    }

    /// Serve `response` whenever the first argument equals `subcommand`.
    pub fn on_subcommand(self, subcommand: impl Into<String>, response: MockResponse) -> Self {
        self.state.lock().keyed.insert(subcommand.into(), response);
        self
    }

    /// Every call fails as if the executable were missing.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        self.state.lock().spawn_error = Some(message.into());
        self
    }

    /// Every call fails with a timeout.
    pub fn simulate_timeout(self, seconds: u64) -> Self {
        self.state.lock().timeout_after = Some(seconds);
        self
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn was_called(&self, subcommand: &str) -> bool {
        self.state
            .lock()
            .calls
            .iter()
            .any(|c| c.subcommand() == Some(subcommand))
    }

    /// Subcommands in call order.
    pub fn subcommands(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| c.subcommand().map(str::to_string))
            .collect()
    }

    /// Record the call and decide its fate under one lock.
    fn dispatch(&self, command: &CommandSpec) -> RunnerResult<MockResponse> {
        let mut state = self.state.lock();
        state.calls.push(CapturedCall {
            program: command.program.clone(),
            args: command.args.clone(),
            env: command.env.clone(),
            workdir: command.workdir.clone(),
        });

        if let Some(reason) = state.spawn_error.clone() {
            return Err(RunnerError::SpawnFailed {
                program: command.program.clone(),
                reason,
            });
        }
        if let Some(seconds) = state.timeout_after {
            return Err(RunnerError::Timeout(seconds));
        }
        Ok(state.pick(command))
    }
}

fn write_artifacts(dir: &Path, files: &[(String, String)]) -> RunnerResult<()> {
    for (name, content) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
    }
    Ok(())
}

#[async_trait]
impl ToolRunner for MockRunner {
    async fn run(&self, command: &CommandSpec, _config: &RunConfig) -> RunnerResult<ExecutionResult> {
        let response = self.dispatch(command)?;
        if let Some(dir) = &command.workdir {
            write_artifacts(dir, &response.files)?;
        }

        let started_at = Utc::now();
        Ok(ExecutionResult {
            command: command.display(),
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(response.duration_ms as i64),
            duration_ms: response.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_cycle() {
        let runner = MockRunner::new()
            .add_response(MockResponse::success("first"))
            .add_response(MockResponse::failure(1, "second"));
        let command = CommandSpec::new("terraform").arg("plan");

        let mut outputs = Vec::new();
        for _ in 0..3 {
            let result = runner.run(&command, &RunConfig::default()).await.unwrap();
            outputs.push((result.exit_code, result.combined_output()));
        }

        assert_eq!(
            outputs,
            vec![(0, "first".to_string()), (1, "second".to_string()), (0, "first".to_string())]
        );
    }

    #[tokio::test]
    async fn test_keyed_responses_win() {
        let runner = MockRunner::new()
            .add_response(MockResponse::success("default"))
            .on_subcommand("validate", MockResponse::success("{\"valid\":true}"));

        let validate = CommandSpec::new("terraform").arg("validate");
        let init = CommandSpec::new("terraform").arg("init");

        let r1 = runner.run(&validate, &RunConfig::default()).await.unwrap();
        let r2 = runner.run(&init, &RunConfig::default()).await.unwrap();

        assert_eq!(r1.stdout, "{\"valid\":true}");
        assert_eq!(r2.stdout, "default");
        assert_eq!(runner.subcommands(), vec!["validate", "init"]);
    }

    #[tokio::test]
    async fn test_artifacts_land_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new()
            .add_response(MockResponse::success("").with_file("out/plan.txt", "planned"));

        let command = CommandSpec::new("terraform").arg("plan").workdir(dir.path());
        runner.run(&command, &RunConfig::default()).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("out/plan.txt")).unwrap();
        assert_eq!(content, "planned");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_still_recorded() {
        let runner = MockRunner::new().simulate_failure("no such file");

        let command = CommandSpec::new("terraform").arg("apply");
        let result = runner.run(&command, &RunConfig::default()).await;

        assert!(matches!(result, Err(RunnerError::SpawnFailed { .. })));
        assert_eq!(runner.call_count(), 1);
    }
}
