//! Constraint to executable resolution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use semver::Version;
use tfrelay_runner::{CommandSpec, RunConfig, ToolRunner};
use tracing::{debug, info, warn};

use crate::cache::{VersionCache, VersionCacheEntry};
use crate::constraint::{parse_version_tag, VersionConstraint};
use crate::error::{ToolError, ToolResult};
use crate::installer::ToolInstaller;
use crate::source::VersionSource;

/// An executable selected for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub path: PathBuf,
    /// Exact version, when known
    pub version: Option<Version>,
}

impl ResolvedTool {
    pub fn program(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Maps version constraints to terraform executables.
///
/// Lookup order is: installed versions, then the cached list of installable
/// versions (refreshed once on a miss). A version is installed at most once
/// even under concurrent requests.
pub struct VersionResolver {
    default_executable: String,
    cache: Arc<VersionCache>,
    source: Arc<dyn VersionSource>,
    installer: Arc<dyn ToolInstaller>,
    runner: Arc<dyn ToolRunner>,
    install_locks: Mutex<HashMap<Version, Arc<tokio::sync::Mutex<()>>>>,
}

impl VersionResolver {
    pub fn new(
        default_executable: impl Into<String>,
        cache: Arc<VersionCache>,
        source: Arc<dyn VersionSource>,
        installer: Arc<dyn ToolInstaller>,
        runner: Arc<dyn ToolRunner>,
    ) -> Self {
        Self {
            default_executable: default_executable.into(),
            cache,
            source,
            installer,
            runner,
            install_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `constraint` to an executable, installing it if needed.
    ///
    /// A blank constraint returns the default executable.
    pub async fn resolve(&self, constraint: &str) -> ToolResult<ResolvedTool> {
        if constraint.trim().is_empty() {
            let path = PathBuf::from(&self.default_executable);
            let version = self.detect_version(&self.default_executable).await;
            return Ok(ResolvedTool { path, version });
        }

        let parsed: VersionConstraint = constraint.parse()?;

        let installed = self.installer.installed_versions();
        if let Some(version) = parsed.closest(&installed) {
            debug!(constraint = %parsed, version = %version, "Using installed terraform");
            return Ok(ResolvedTool {
                path: self.installer.executable_path(version),
                version: Some(version.clone()),
            });
        }

        let mut available = self.cache.versions(self.source.as_ref()).await;
        if parsed.closest(&available).is_none() {
            debug!(constraint = %parsed, "Cache miss, refreshing version list");
            available = self.cache.refresh(self.source.as_ref()).await;
        }

        let version = parsed
            .closest(&available)
            .cloned()
            .ok_or_else(|| ToolError::NotFound {
                constraint: constraint.to_string(),
                reason: "no known release satisfies it".to_string(),
            })?;

        let path = self
            .install_once(&version)
            .await
            .map_err(|e| ToolError::NotFound {
                constraint: constraint.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ResolvedTool {
            path,
            version: Some(version),
        })
    }

    /// Install `version` unless it is already present.
    ///
    /// Concurrent callers for the same version wait on one install.
    pub async fn install_once(&self, version: &Version) -> ToolResult<PathBuf> {
        let lock = self
            .install_locks
            .lock()
            .entry(version.clone())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        if self.installer.is_installed(version) {
            return Ok(self.installer.executable_path(version));
        }

        info!(version = %version, "Terraform version not installed");
        self.installer.install(version).await
    }

    /// Known versions with their installation status.
    pub async fn entries(&self) -> Vec<VersionCacheEntry> {
        let mut versions = self.cache.snapshot().await;
        versions.extend(self.installer.installed_versions());

        versions
            .into_iter()
            .map(|v| {
                let installed = self.installer.is_installed(&v);
                VersionCacheEntry {
                    version: v.to_string(),
                    installed,
                    path: installed.then(|| self.installer.executable_path(&v)),
                }
            })
            .collect()
    }

    /// Ask an executable for its version via `version -json`.
    pub async fn detect_version(&self, program: &str) -> Option<Version> {
        let command = CommandSpec::new(program).args(["version", "-json"]);
        let result = match self.runner.run(&command, &RunConfig::default().timeout(30)).await {
            Ok(r) if r.success() => r,
            Ok(r) => {
                warn!(program, exit_code = r.exit_code, "Version check failed");
                return None;
            }
            Err(e) => {
                warn!(program, error = %e, "Version check failed");
                return None;
            }
        };

        serde_json::from_str::<serde_json::Value>(&result.stdout)
            .ok()
            .and_then(|v| v.get("terraform_version")?.as_str().map(str::to_string))
            .and_then(|v| parse_version_tag(&v))
    }
}
