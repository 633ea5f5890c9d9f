//! Installing terraform release binaries.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use semver::Version;
use tracing::{debug, info};

use crate::error::{ToolError, ToolResult};

/// Places terraform executables on disk, one directory per version.
#[async_trait]
pub trait ToolInstaller: Send + Sync {
    /// Where the executable for `version` lives once installed.
    fn executable_path(&self, version: &Version) -> PathBuf;

    fn is_installed(&self, version: &Version) -> bool {
        self.executable_path(version).is_file()
    }

    /// Versions already present on disk.
    fn installed_versions(&self) -> Vec<Version>;

    /// Install `version` and return the executable path.
    async fn install(&self, version: &Version) -> ToolResult<PathBuf>;
}

/// Downloads official release archives from releases.hashicorp.com.
///
/// Layout: `<install_dir>/<version>/terraform`.
pub struct HashicorpInstaller {
    install_dir: PathBuf,
    download_base_url: String,
    client: reqwest::Client,
}

impl HashicorpInstaller {
    pub fn new(install_dir: impl Into<PathBuf>, download_base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tfrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self {
            install_dir: install_dir.into(),
            download_base_url: download_base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Archive URL for `version` on the current platform.
    pub fn archive_url(&self, version: &Version) -> String {
        format!(
            "{base}/{v}/terraform_{v}_{os}_{arch}.zip",
            base = self.download_base_url,
            v = version,
            os = platform_os(),
            arch = platform_arch(),
        )
    }
}

fn executable_name() -> &'static str {
    if cfg!(windows) {
        "terraform.exe"
    } else {
        "terraform"
    }
}

fn platform_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn platform_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

/// Pull the executable out of a release archive into `target`.
fn extract_executable(archive: &[u8], target: &Path) -> ToolResult<()> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let mut entry = zip.by_name(executable_name())?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;

    let dir = target
        .parent()
        .ok_or_else(|| ToolError::Io(std::io::Error::other("install target has no parent")))?;
    std::fs::create_dir_all(dir)?;

    // Write next to the target and rename so a partial file is never visible.
    let partial = target.with_extension("partial");
    std::fs::write(&partial, &bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&partial, std::fs::Permissions::from_mode(0o755))?;
    }

    std::fs::rename(&partial, target)?;
    Ok(())
}

#[async_trait]
impl ToolInstaller for HashicorpInstaller {
    fn executable_path(&self, version: &Version) -> PathBuf {
        self.install_dir
            .join(version.to_string())
            .join(executable_name())
    }

    fn installed_versions(&self) -> Vec<Version> {
        let Ok(entries) = std::fs::read_dir(&self.install_dir) else {
            return Vec::new();
        };

        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| Version::parse(&e.file_name().to_string_lossy()).ok())
            .filter(|v| self.is_installed(v))
            .collect()
    }

    async fn install(&self, version: &Version) -> ToolResult<PathBuf> {
        let url = self.archive_url(version);
        info!(version = %version, url = %url, "Installing terraform");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ToolError::Install {
                version: version.to_string(),
                reason: format!("{} returned {}", url, response.status()),
            });
        }
        let archive = response.bytes().await?;
        debug!(bytes = archive.len(), "Downloaded release archive");

        let target = self.executable_path(version);
        let extract_target = target.clone();
        tokio::task::spawn_blocking(move || extract_executable(&archive, &extract_target))
            .await
            .map_err(|e| ToolError::Install {
                version: version.to_string(),
                reason: e.to_string(),
            })??;

        info!(version = %version, path = %target.display(), "Installed terraform");
        Ok(target)
    }
}
