//! Request orchestration.
//!
//! A request moves through validation, materialization into a workspace,
//! execution of the terraform operation matching its type, and assembly of
//! the outcome. Anything that fails after validation becomes a failed
//! [`ExecutionOutcome`] rather than an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use tfrelay_iac::{IacError, TerraformExecutor, TerraformTarget, ValidationReport};
use tfrelay_runner::{RunConfig, ToolRunner};
use tfrelay_tool::VersionResolver;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{CoreError, CoreResult};
use crate::git::GitFetcher;
use crate::models::{
    ExecutionOutcome, ExecutionRequest, HealthStatus, RequestType, ScriptSource, SystemStatus,
};
use crate::workspace::{
    read_generated_files, read_state, PreparedWorkspace, WorkspaceManager, EXCLUDED_OUTPUT_FILES,
};

const HEALTH_CHECK_FILE: &str = "hello_world.tf";
const HEALTH_CHECK_SCRIPT: &str = r#"output "hello_world" {
  value = "Hello, World!"
}
"#;

/// Turns requests into outcomes.
pub struct RequestService {
    config: Arc<ServiceConfig>,
    workspaces: WorkspaceManager,
    git: GitFetcher,
    resolver: Arc<VersionResolver>,
    executor: TerraformExecutor,
}

impl RequestService {
    pub fn new(
        config: Arc<ServiceConfig>,
        runner: Arc<dyn ToolRunner>,
        resolver: Arc<VersionResolver>,
    ) -> Self {
        let run_config = RunConfig::default().timeout(config.command_timeout_seconds);
        Self {
            workspaces: WorkspaceManager::new(&config.workspace_root),
            git: GitFetcher::new(runner.clone()),
            executor: TerraformExecutor::new(runner).with_run_config(run_config),
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Reject requests that must never reach execution.
    pub fn validate_request(&self, request: &ExecutionRequest) -> CoreResult<()> {
        if request.request_type.requires_state() && request.state().is_none() {
            return Err(CoreError::InvalidRequest(format!(
                "terraform state is required for {} requests",
                request.request_type
            )));
        }

        match &request.source {
            ScriptSource::Inline(files) if files.is_empty() => Err(CoreError::InvalidRequest(
                "no script files provided".to_string(),
            )),
            ScriptSource::Git(details) if details.repo_url.trim().is_empty() => Err(
                CoreError::InvalidRequest("git repository url is required".to_string()),
            ),
            ScriptSource::Directory(dir) => {
                let has_files = std::fs::read_dir(dir)
                    .map(|entries| {
                        entries
                            .filter_map(|e| e.ok())
                            .any(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                    })
                    .unwrap_or(false);
                if has_files {
                    Ok(())
                } else {
                    Err(CoreError::InvalidRequest(format!(
                        "no terraform script files found in directory {}",
                        dir.display()
                    )))
                }
            }
            _ => Ok(()),
        }
    }

    /// Synchronous path: validate, execute, clean up, return.
    pub async fn handle(&self, request: &ExecutionRequest) -> CoreResult<ExecutionOutcome> {
        let span = request_span(request);
        async {
            if let Err(e) = self.validate_request(request) {
                warn!(error = %e, "Request rejected");
                return Err(e);
            }
            if request.is_async() {
                let e = CoreError::InvalidRequest(
                    "webhookConfig is only accepted on the asynchronous path".to_string(),
                );
                warn!(error = %e, "Request rejected");
                return Err(e);
            }
            let (outcome, workspace) = self.execute(request).await;
            if let Some(workspace) = workspace {
                self.cleanup(&workspace);
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    /// Materialize and run a validated request.
    ///
    /// Never fails; errors become failed outcomes. The workspace is returned
    /// so the caller decides when to clean it up.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> (ExecutionOutcome, Option<PreparedWorkspace>) {
        let workspace = match self.materialize(request).await {
            Ok(ws) => ws,
            Err(e) => {
                error!(error = %e, "Failed to prepare workspace");
                self.workspaces.cleanup_id(request.request_id);
                return (ExecutionOutcome::failure(request, e.to_string()), None);
            }
        };

        let outcome = match self.run(request, &workspace).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Request execution failed");
                ExecutionOutcome::failure(request, e.to_string())
            }
        };
        info!(success = outcome.success, version = %outcome.tool_version_used, "Outcome assembled");
        (outcome, Some(workspace))
    }

    /// Remove a workspace unless configured to keep them.
    pub fn cleanup(&self, workspace: &PreparedWorkspace) {
        if self.config.clean_workspace_after_deployment {
            self.workspaces.cleanup(workspace);
        }
    }

    async fn materialize(&self, request: &ExecutionRequest) -> CoreResult<PreparedWorkspace> {
        let id = request.request_id;
        let state = request.state();

        match &request.source {
            ScriptSource::Inline(files) => self.workspaces.materialize_inline(id, files, state),
            ScriptSource::Git(details) => {
                let root = self.workspaces.reserve(id)?;
                self.git.clone_into(details, &root).await?;
                self.workspaces
                    .materialize_cloned(id, details.script_path.as_deref(), state)
            }
            ScriptSource::Directory(dir) => {
                self.workspaces.materialize_directory(id, dir, state)
            }
        }
    }

    async fn run(
        &self,
        request: &ExecutionRequest,
        workspace: &PreparedWorkspace,
    ) -> CoreResult<ExecutionOutcome> {
        let tool = self
            .resolver
            .resolve(&request.tool_version_constraint)
            .await?;
        let tool_version_used = tool
            .version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| request.tool_version_constraint.clone());

        let target = TerraformTarget::new(tool.program(), &workspace.scripts_dir)
            .with_env(request.env_variables.clone());
        let vars = &request.variables;

        let mut outcome = ExecutionOutcome {
            request_id: request.request_id,
            request_type: request.request_type,
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            final_state: None,
            generated_files: Default::default(),
            tool_version_used,
            plan: None,
            validation: None,
        };

        let raw = match request.request_type {
            RequestType::Validate => {
                let raw = self.executor.validate(&target).await?;
                match ValidationReport::parse(&raw.stdout) {
                    Ok(report) => {
                        outcome.validation = Some(report);
                    }
                    // A failed init prints plain text instead of a report.
                    Err(_) if !raw.success => {
                        outcome.validation = Some(ValidationReport::failed(
                            "Initialization failed",
                            raw.stderr.trim(),
                        ));
                    }
                    Err(e) => return Err(e.into()),
                }
                raw
            }
            RequestType::Plan => {
                let planned = self.executor.plan_as_json(&target, vars).await?;
                if let Some(json) = &planned.json {
                    serde_json::from_str::<serde_json::Value>(json)
                        .map_err(|e| IacError::malformed("show", e))?;
                }
                outcome.plan = planned.json;
                planned.result
            }
            RequestType::Deploy | RequestType::Modify if request.plan_only => {
                self.executor.plan(&target, vars).await?
            }
            RequestType::Deploy | RequestType::Modify => self.executor.apply(&target, vars).await?,
            RequestType::Destroy if request.plan_only => {
                self.executor.plan_destroy(&target, vars).await?
            }
            RequestType::Destroy => self.executor.destroy(&target, vars).await?,
        };

        outcome.success = match &outcome.validation {
            Some(report) => report.valid,
            None => raw.success,
        };
        outcome.stdout = raw.stdout;
        outcome.stderr = raw.stderr;
        outcome.final_state = read_state(&workspace.scripts_dir);

        let mut excluding = workspace.script_files.clone();
        excluding.extend(EXCLUDED_OUTPUT_FILES.iter().map(|s| s.to_string()));
        outcome.generated_files = read_generated_files(&workspace.scripts_dir, &excluding);

        Ok(outcome)
    }

    /// Validate a one-file configuration with the default executable.
    pub async fn health_check(&self, request_id: Uuid) -> SystemStatus {
        let span = info_span!("request", request_id = %request_id, request_type = "health-check");
        async {
            let mut status = SystemStatus {
                request_id,
                health_status: HealthStatus::Nok,
                service_type: self.config.service_type.clone(),
                service_url: self.config.service_url.clone(),
                error_message: None,
            };

            match self.check_health(request_id).await {
                Ok(()) => status.health_status = HealthStatus::Ok,
                Err(message) => {
                    warn!(error = %message, "Health check failed");
                    status.error_message = Some(message);
                }
            }
            status
        }
        .instrument(span)
        .await
    }

    async fn check_health(&self, request_id: Uuid) -> Result<(), String> {
        let files = BTreeMap::from([(
            HEALTH_CHECK_FILE.to_string(),
            HEALTH_CHECK_SCRIPT.to_string(),
        )]);
        let workspace = self
            .workspaces
            .materialize_inline(request_id, &files, None)
            .map_err(|e| e.to_string())?;

        let result = async {
            let tool = self.resolver.resolve("").await.map_err(|e| e.to_string())?;
            let target = TerraformTarget::new(tool.program(), &workspace.scripts_dir);
            let raw = self
                .executor
                .validate(&target)
                .await
                .map_err(|e| e.to_string())?;
            let report = ValidationReport::parse(&raw.stdout).map_err(|e| {
                if raw.stderr.is_empty() {
                    e.to_string()
                } else {
                    raw.stderr.clone()
                }
            })?;
            if report.valid {
                Ok(())
            } else {
                Err(report.summary())
            }
        }
        .await;

        self.workspaces.cleanup(&workspace);
        result
    }
}

/// Span correlating every log line of one request.
pub fn request_span(request: &ExecutionRequest) -> tracing::Span {
    info_span!(
        "request",
        request_id = %request.request_id,
        request_type = %request.request_type
    )
}
