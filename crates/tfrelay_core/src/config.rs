//! Service configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or
//! no file at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tfrelay_runner::ToolRunner;
use tfrelay_tool::{
    parse_version_tag, GithubTagsSource, HashicorpInstaller, StaticVersionSource, VersionCache,
    VersionResolver, VersionSource,
};
use tracing::info;

use crate::error::{CoreError, CoreResult};

fn data_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join("tfrelay").join(name)
}

fn default_workspace_root() -> PathBuf {
    data_dir("workspaces")
}

fn default_result_store_root() -> PathBuf {
    data_dir("results")
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    3600
}

fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_callback_timeout() -> u64 {
    30
}

fn default_bind_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_service_type() -> String {
    "tfrelay".to_string()
}

fn default_service_url() -> String {
    "http://localhost:9090".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Parent of the per-request workspaces
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Where undeliverable async results are kept
    #[serde(default = "default_result_store_root")]
    pub result_store_root: PathBuf,

    #[serde(default = "default_true")]
    pub clean_workspace_after_deployment: bool,

    /// Per-command timeout (0 = no timeout)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_seconds: u64,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_service_type")]
    pub service_type: String,

    #[serde(default = "default_service_url")]
    pub service_url: String,

    #[serde(default)]
    pub tool: ToolConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            result_store_root: default_result_store_root(),
            clean_workspace_after_deployment: true,
            command_timeout_seconds: default_command_timeout(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            callback_timeout_seconds: default_callback_timeout(),
            bind_address: default_bind_address(),
            service_type: default_service_type(),
            service_url: default_service_url(),
            tool: ToolConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Configuration rooted in `dir`, used by tests and the CLI's one-shot mode.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            workspace_root: dir.join("workspaces"),
            result_store_root: dir.join("results"),
            tool: ToolConfig {
                install_dir: dir.join("terraform"),
                ..ToolConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_seconds)
    }
}

fn default_executable() -> String {
    "terraform".to_string()
}

fn default_install_dir() -> PathBuf {
    data_dir("terraform")
}

fn default_versions_api_url() -> String {
    "https://api.github.com/repos/hashicorp/terraform/tags".to_string()
}

fn default_download_base_url() -> String {
    "https://releases.hashicorp.com/terraform".to_string()
}

fn default_versions() -> Vec<String> {
    ["1.6.0", "1.7.0", "1.8.0", "1.9.0", "1.10.0"]
        .iter()
        .map(|v| v.to_string())
        .collect()
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Terraform resolution and installation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable used for requests without a constraint
    #[serde(default = "default_executable")]
    pub default_executable: String,

    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    #[serde(default = "default_versions_api_url")]
    pub versions_api_url: String,

    #[serde(default = "default_download_base_url")]
    pub download_base_url: String,

    /// Always known, even when the remote lookup fails
    #[serde(default = "default_versions")]
    pub default_versions: Vec<String>,

    /// Never query the remote version list
    #[serde(default)]
    pub default_versions_only: bool,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            default_executable: default_executable(),
            install_dir: default_install_dir(),
            versions_api_url: default_versions_api_url(),
            download_base_url: default_download_base_url(),
            default_versions: default_versions(),
            default_versions_only: false,
            cache_ttl_seconds: default_cache_ttl(),
        }
    }
}

impl ToolConfig {
    /// Build the resolver described by this configuration.
    pub fn build_resolver(&self, runner: Arc<dyn ToolRunner>) -> VersionResolver {
        let defaults: Vec<_> = self
            .default_versions
            .iter()
            .filter_map(|v| parse_version_tag(v))
            .collect();

        let source: Arc<dyn VersionSource> = if self.default_versions_only {
            Arc::new(StaticVersionSource::new(defaults.clone()))
        } else {
            Arc::new(GithubTagsSource::new(&self.versions_api_url))
        };

        VersionResolver::new(
            &self.default_executable,
            Arc::new(VersionCache::new(
                Duration::from_secs(self.cache_ttl_seconds),
                defaults,
            )),
            source,
            Arc::new(HashicorpInstaller::new(
                &self.install_dir,
                &self.download_base_url,
            )),
            runner,
        )
    }
}
