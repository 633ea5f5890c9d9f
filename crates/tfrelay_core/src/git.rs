//! Git operations for fetching scripts.
//!
//! Repositories are cloned with the `git` command line through a
//! [`ToolRunner`], so tests can stand in a mock.

use std::path::Path;
use std::sync::Arc;

use tfrelay_runner::{CommandSpec, RunConfig, ToolRunner};
use tracing::{debug, info};
use url::Url;

use crate::error::{CoreError, CoreResult};
use crate::models::{GitCredentials, GitRepoDetails};

/// Clones script repositories into workspaces.
pub struct GitFetcher {
    runner: Arc<dyn ToolRunner>,
    run_config: RunConfig,
}

impl GitFetcher {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            run_config: RunConfig::default().timeout(600),
        }
    }

    /// Check if Git is available on the system.
    pub async fn is_git_available(&self) -> bool {
        let command = CommandSpec::new("git").arg("--version");
        self.runner
            .run(&command, &RunConfig::default().timeout(10))
            .await
            .map(|r| r.success())
            .unwrap_or(false)
    }

    /// Shallow-clone `details` into `dest`, which must be empty.
    pub async fn clone_into(&self, details: &GitRepoDetails, dest: &Path) -> CoreResult<()> {
        let url = clone_url(&details.repo_url, details.credentials.as_ref())?;

        let mut command = CommandSpec::new("git")
            .args(["clone", "--depth", "1"])
            .workdir(dest)
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(branch) = details.branch.as_deref().filter(|b| !b.trim().is_empty()) {
            command = command.args(["--branch", branch]);
        }
        command = command.args([url.as_str(), "."]);

        info!(repo = %details.repo_url, branch = ?details.branch, "Cloning scripts repository");
        let result = self.runner.run(&command, &self.run_config).await?;

        if !result.success() {
            return Err(CoreError::Git(format!(
                "git clone of {} failed: {}",
                details.repo_url,
                redact(result.stderr.trim(), details.credentials.as_ref())
            )));
        }

        debug!(dest = %dest.display(), "Clone finished");
        Ok(())
    }
}

/// Inject credentials into an http(s) URL. Other schemes pass through.
fn clone_url(repo_url: &str, credentials: Option<&GitCredentials>) -> CoreResult<String> {
    let Some(credentials) = credentials else {
        return Ok(repo_url.to_string());
    };

    let mut url = Url::parse(repo_url)
        .map_err(|e| CoreError::InvalidRequest(format!("invalid repository url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Ok(repo_url.to_string());
    }

    url.set_username(&credentials.username)
        .and_then(|_| url.set_password(Some(&credentials.token)))
        .map_err(|_| CoreError::InvalidRequest("repository url cannot carry credentials".into()))?;
    Ok(url.into())
}

fn redact(text: &str, credentials: Option<&GitCredentials>) -> String {
    match credentials {
        Some(c) if !c.token.is_empty() => text.replace(&c.token, "***"),
        _ => text.to_string(),
    }
}
