//! Request and outcome models.
//!
//! Wire format is camelCase JSON. The script source is chosen by which of
//! `scriptFiles`, `gitRepoDetails` or `scriptsDirectory` is present, and a
//! request is asynchronous when it carries a `webhookConfig`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use tfrelay_iac::{Diagnostic, Severity, ValidationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "VALIDATE", alias = "validate")]
    Validate,
    #[serde(rename = "PLAN", alias = "plan")]
    Plan,
    #[serde(rename = "DEPLOY", alias = "deploy")]
    Deploy,
    #[serde(rename = "MODIFY", alias = "modify")]
    Modify,
    #[serde(rename = "DESTROY", alias = "destroy")]
    Destroy,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Validate => "validate",
            RequestType::Plan => "plan",
            RequestType::Deploy => "deploy",
            RequestType::Modify => "modify",
            RequestType::Destroy => "destroy",
        }
    }

    /// MODIFY and DESTROY act on existing infrastructure and need its state.
    pub fn requires_state(&self) -> bool {
        matches!(self, RequestType::Modify | RequestType::Destroy)
    }

    /// Whether the operation can change infrastructure.
    pub fn is_deployment(&self) -> bool {
        matches!(
            self,
            RequestType::Deploy | RequestType::Modify | RequestType::Destroy
        )
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "validate" => Ok(RequestType::Validate),
            "plan" => Ok(RequestType::Plan),
            "deploy" => Ok(RequestType::Deploy),
            "modify" => Ok(RequestType::Modify),
            "destroy" => Ok(RequestType::Destroy),
            other => Err(format!("unknown request type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCredentials {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepoDetails {
    #[serde(alias = "url")]
    pub repo_url: String,
    /// Branch or tag; the remote's default branch when absent
    #[serde(default, alias = "ref")]
    pub branch: Option<String>,
    /// Directory inside the repository holding the scripts
    #[serde(default, alias = "subPath")]
    pub script_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<GitCredentials>,
}

/// Where a request's scripts come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptSource {
    /// File name to content
    #[serde(rename = "scriptFiles")]
    Inline(BTreeMap<String, String>),
    #[serde(rename = "gitRepoDetails")]
    Git(GitRepoDetails),
    /// An existing directory on this host
    #[serde(rename = "scriptsDirectory")]
    Directory(PathBuf),
}

impl ScriptSource {
    /// Route segment and queue suffix for this source.
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptSource::Inline(_) => "scripts",
            ScriptSource::Git(_) => "git",
            ScriptSource::Directory(_) => "directory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub url: String,
}

/// One terraform request, synchronous unless `callback` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub request_id: Uuid,
    pub request_type: RequestType,
    /// Version constraint such as `>= 1.6.0`; blank selects the default tool
    #[serde(default, alias = "terraformVersion")]
    pub tool_version_constraint: String,
    #[serde(default, alias = "isPlanOnly")]
    pub plan_only: bool,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub env_variables: HashMap<String, String>,
    #[serde(default, alias = "tfState", skip_serializing_if = "Option::is_none")]
    pub prior_state: Option<String>,
    #[serde(flatten)]
    pub source: ScriptSource,
    #[serde(default, rename = "webhookConfig", skip_serializing_if = "Option::is_none")]
    pub callback: Option<WebhookConfig>,
}

impl ExecutionRequest {
    pub fn new(request_type: RequestType, source: ScriptSource) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request_type,
            tool_version_constraint: String::new(),
            plan_only: false,
            variables: HashMap::new(),
            env_variables: HashMap::new(),
            prior_state: None,
            source,
            callback: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.request_id = id;
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.tool_version_constraint = constraint.into();
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.prior_state = Some(state.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback = Some(WebhookConfig { url: url.into() });
        self
    }

    pub fn plan_only(mut self, plan_only: bool) -> Self {
        self.plan_only = plan_only;
        self
    }

    /// Prior state, if present and not blank.
    pub fn state(&self) -> Option<&str> {
        self.prior_state
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn is_async(&self) -> bool {
        self.callback.is_some()
    }
}

/// The result of one request. Produced once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub request_id: Uuid,
    pub request_type: RequestType,
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub final_state: Option<String>,
    #[serde(default)]
    pub generated_files: HashMap<String, String>,
    #[serde(default)]
    pub tool_version_used: String,
    /// `show -json` output of a PLAN request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Parsed diagnostics of a VALIDATE request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl ExecutionOutcome {
    /// A failed outcome carrying `message` as stderr.
    ///
    /// The request's constraint stands in for the version since no tool may
    /// have been resolved.
    pub fn failure(request: &ExecutionRequest, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            request_id: request.request_id,
            request_type: request.request_type,
            success: false,
            stdout: String::new(),
            stderr: message.clone(),
            final_state: None,
            generated_files: HashMap::new(),
            tool_version_used: request.tool_version_constraint.clone(),
            plan: None,
            validation: (request.request_type == RequestType::Validate)
                .then(|| ValidationReport::failed("Request failed", message)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Nok,
}

/// Health report of this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub request_id: Uuid,
    pub health_status: HealthStatus,
    pub service_type: String,
    pub service_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefetchState {
    Ok,
    InProgress,
    NotFound,
    ParseFailed,
}

/// Per-id answer of a batch result lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefetchResult {
    pub request_id: Uuid,
    pub state: RefetchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExecutionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
