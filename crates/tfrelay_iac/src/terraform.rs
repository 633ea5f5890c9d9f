//! Terraform command executor.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use tfrelay_runner::{CommandSpec, ExecutionResult, RunConfig, ToolRunner};

use crate::error::IacResult;

/// Input variables passed with `-var`.
pub type Variables = HashMap<String, Value>;

/// Plan file written by [`TerraformExecutor::plan_as_json`].
pub const PLAN_FILE: &str = "tfplan.binary";

/// Outcome of one terraform invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub success: bool,
}

impl From<ExecutionResult> for RawResult {
    fn from(result: ExecutionResult) -> Self {
        Self {
            success: result.success(),
            command: result.command,
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
        }
    }
}

/// Result of a plan rendered as JSON.
#[derive(Debug, Clone)]
pub struct PlanJson {
    /// The `plan` step, with its human readable output
    pub result: RawResult,
    /// `show -json` output, present when both steps succeeded
    pub json: Option<String>,
}

/// Which executable runs, where, and with what extra environment.
#[derive(Debug, Clone)]
pub struct TerraformTarget {
    pub program: String,
    pub directory: PathBuf,
    pub env: HashMap<String, String>,
}

impl TerraformTarget {
    pub fn new(program: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            directory: directory.into(),
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
            .workdir(&self.directory)
            .env("TF_IN_AUTOMATION", "1")
            .envs(&self.env)
    }

    fn is_initialized(&self) -> bool {
        self.directory.join(".terraform").is_dir()
    }
}

/// Terraform operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Validate,
    Plan,
    PlanDestroy,
    Apply,
    Destroy,
}

impl Operation {
    fn args(&self) -> &'static [&'static str] {
        match self {
            Operation::Validate => &["validate", "-json", "-no-color"],
            Operation::Plan => &["plan", "-input=false", "-no-color"],
            Operation::PlanDestroy => &["plan", "-destroy", "-input=false", "-no-color"],
            Operation::Apply => &["apply", "-auto-approve", "-input=false", "-no-color"],
            Operation::Destroy => &["destroy", "-auto-approve", "-input=false", "-no-color"],
        }
    }

    fn takes_variables(&self) -> bool {
        !matches!(self, Operation::Validate)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Validate => "validate",
            Operation::Plan => "plan",
            Operation::PlanDestroy => "plan-destroy",
            Operation::Apply => "apply",
            Operation::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Render one `-var` value. Strings go in raw, everything else as JSON.
fn var_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn var_args(variables: &Variables) -> Vec<String> {
    let mut names: Vec<&String> = variables.keys().collect();
    names.sort();

    names
        .into_iter()
        .flat_map(|name| {
            let value = var_value(&variables[name]);
            ["-var".to_string(), format!("{}={}", name, value)]
        })
        .collect()
}

fn join_output(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_string(),
        (_, true) => first.to_string(),
        _ => format!("{}\n{}", first, second),
    }
}

/// Runs terraform operations through a [`ToolRunner`].
///
/// Each operation runs `init` first unless the directory already holds a
/// `.terraform` directory. A failed `init` is returned as the operation's
/// result.
pub struct TerraformExecutor {
    runner: Arc<dyn ToolRunner>,
    run_config: RunConfig,
}

impl TerraformExecutor {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            run_config: RunConfig::default(),
        }
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    /// `terraform validate -json`. Variables do not apply.
    pub async fn validate(&self, target: &TerraformTarget) -> IacResult<RawResult> {
        self.run_operation(Operation::Validate, target, &Variables::new())
            .await
    }

    pub async fn plan(&self, target: &TerraformTarget, variables: &Variables) -> IacResult<RawResult> {
        self.run_operation(Operation::Plan, target, variables).await
    }

    pub async fn plan_destroy(
        &self,
        target: &TerraformTarget,
        variables: &Variables,
    ) -> IacResult<RawResult> {
        self.run_operation(Operation::PlanDestroy, target, variables)
            .await
    }

    pub async fn apply(&self, target: &TerraformTarget, variables: &Variables) -> IacResult<RawResult> {
        self.run_operation(Operation::Apply, target, variables).await
    }

    pub async fn destroy(
        &self,
        target: &TerraformTarget,
        variables: &Variables,
    ) -> IacResult<RawResult> {
        self.run_operation(Operation::Destroy, target, variables)
            .await
    }

    /// `plan -out` followed by `show -json` on the saved plan.
    ///
    /// The plan file is removed afterwards. Variables are passed to the plan
    /// step since terraform needs them to compute changes.
    pub async fn plan_as_json(
        &self,
        target: &TerraformTarget,
        variables: &Variables,
    ) -> IacResult<PlanJson> {
        if let Some(failed) = self.init_if_needed(target).await? {
            return Ok(PlanJson {
                result: failed,
                json: None,
            });
        }

        let plan = target
            .command()
            .args(Operation::Plan.args().iter().copied())
            .arg(format!("-out={}", PLAN_FILE))
            .args(var_args(variables));
        let mut result = self.execute(&plan).await?;
        if !result.success {
            return Ok(PlanJson { result, json: None });
        }

        let show = target
            .command()
            .args(["show", "-json", "-no-color", PLAN_FILE]);
        let shown = self.execute(&show).await;
        remove_plan_file(&target.directory);
        let shown = shown?;

        if !shown.success {
            result.success = false;
            result.exit_code = shown.exit_code;
            result.stderr = join_output(&result.stderr, &shown.stderr);
            return Ok(PlanJson { result, json: None });
        }

        Ok(PlanJson {
            result,
            json: Some(shown.stdout),
        })
    }

    /// Run `operation`, initializing the directory first if needed.
    pub async fn run_operation(
        &self,
        operation: Operation,
        target: &TerraformTarget,
        variables: &Variables,
    ) -> IacResult<RawResult> {
        info!(operation = %operation, dir = %target.directory.display(), "Running terraform");

        if let Some(failed) = self.init_if_needed(target).await? {
            return Ok(failed);
        }

        let mut command = target.command().args(operation.args().iter().copied());
        if operation.takes_variables() {
            command = command.args(var_args(variables));
        }

        let result = self.execute(&command).await?;
        if !result.success {
            warn!(operation = %operation, exit_code = result.exit_code, "Terraform operation failed");
        }
        Ok(result)
    }

    /// Returns the init result only when init ran and failed.
    async fn init_if_needed(&self, target: &TerraformTarget) -> IacResult<Option<RawResult>> {
        if target.is_initialized() {
            debug!("Working directory already initialized");
            return Ok(None);
        }

        let init = target.command().args(["init", "-input=false", "-no-color"]);
        let result = self.execute(&init).await?;
        if result.success {
            Ok(None)
        } else {
            warn!(exit_code = result.exit_code, "Terraform init failed");
            Ok(Some(result))
        }
    }

    async fn execute(&self, command: &CommandSpec) -> IacResult<RawResult> {
        debug!(command = %command.display(), "Executing");
        let result = self.runner.run(command, &self.run_config).await?;
        Ok(result.into())
    }
}

fn remove_plan_file(directory: &Path) {
    let path = directory.join(PLAN_FILE);
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "Failed to remove plan file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_var_args_sorted_and_typed() {
        let mut vars = Variables::new();
        vars.insert("region".into(), json!("eu-west-1"));
        vars.insert("count".into(), json!(3));
        vars.insert("tags".into(), json!({"env": "dev"}));

        assert_eq!(
            var_args(&vars),
            vec![
                "-var",
                "count=3",
                "-var",
                "region=eu-west-1",
                "-var",
                r#"tags={"env":"dev"}"#,
            ]
        );
    }

    #[test]
    fn test_operation_args() {
        assert_eq!(Operation::Validate.args()[0], "validate");
        assert!(Operation::Apply.args().contains(&"-auto-approve"));
        assert!(Operation::PlanDestroy.args().contains(&"-destroy"));
        assert!(!Operation::Validate.takes_variables());
    }

    #[test]
    fn test_join_output() {
        assert_eq!(join_output("", "b"), "b");
        assert_eq!(join_output("a", ""), "a");
        assert_eq!(join_output("a", "b"), "a\nb");
    }
}
