//! Per-request workspaces.
//!
//! Every request owns `<workspace_root>/<requestId>`. Inline scripts are
//! written there and git repositories are cloned there. A caller-supplied
//! directory is used in place and is never deleted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};

/// State file terraform reads and writes in the scripts directory.
pub const STATE_FILE: &str = "terraform.tfstate";
pub const STATE_BACKUP_FILE: &str = "terraform.tfstate.backup";
pub const LOCK_FILE: &str = ".terraform.lock.hcl";
/// Present while terraform holds the state lock.
pub const STATE_LOCK_INFO_FILE: &str = ".terraform.tfstate.lock.info";

/// Files that are never reported as generated output.
pub const EXCLUDED_OUTPUT_FILES: &[&str] =
    &[STATE_FILE, STATE_BACKUP_FILE, LOCK_FILE, STATE_LOCK_INFO_FILE];

/// A workspace ready for execution.
#[derive(Debug, Clone)]
pub struct PreparedWorkspace {
    /// `<workspace_root>/<requestId>`, removed on cleanup
    pub root: PathBuf,
    /// Directory terraform runs in
    pub scripts_dir: PathBuf,
    /// Script file names present before execution
    pub script_files: Vec<String>,
}

/// Creates, fills and removes request workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace path for a request, whether or not it exists.
    pub fn path_for(&self, request_id: Uuid) -> PathBuf {
        self.root.join(request_id.to_string())
    }

    pub fn exists(&self, request_id: Uuid) -> bool {
        self.path_for(request_id).is_dir()
    }

    /// Create the workspace directory ahead of materialization.
    pub fn reserve(&self, request_id: Uuid) -> CoreResult<PathBuf> {
        let path = self.path_for(request_id);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Write inline scripts into a fresh workspace.
    pub fn materialize_inline(
        &self,
        request_id: Uuid,
        files: &BTreeMap<String, String>,
        prior_state: Option<&str>,
    ) -> CoreResult<PreparedWorkspace> {
        if files.is_empty() {
            return Err(CoreError::InvalidScripts("no script files provided".into()));
        }
        for name in files.keys() {
            validate_relative(name)?;
        }

        let root = self.reserve(request_id)?;
        let result = (|| -> CoreResult<PreparedWorkspace> {
            for (name, content) in files {
                let path = root.join(name);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, content)?;
            }
            self.finish(root.clone(), root.clone(), prior_state)
        })();

        if result.is_err() {
            self.remove(&root);
        }
        result
    }

    /// Prepare a workspace whose root was already filled (e.g. by a clone),
    /// descending into `sub_path` when given.
    pub fn materialize_cloned(
        &self,
        request_id: Uuid,
        sub_path: Option<&str>,
        prior_state: Option<&str>,
    ) -> CoreResult<PreparedWorkspace> {
        let root = self.path_for(request_id);
        let scripts_dir = match sub_path.filter(|p| !p.trim().is_empty()) {
            Some(sub) => {
                validate_relative(sub)?;
                root.join(sub)
            }
            None => root.clone(),
        };

        if !scripts_dir.is_dir() {
            return Err(CoreError::InvalidScripts(format!(
                "script path {} not found in repository",
                sub_path.unwrap_or_default()
            )));
        }
        self.finish(root, scripts_dir, prior_state)
    }

    /// Use an existing directory in place.
    pub fn materialize_directory(
        &self,
        request_id: Uuid,
        directory: &Path,
        prior_state: Option<&str>,
    ) -> CoreResult<PreparedWorkspace> {
        if !directory.is_dir() {
            return Err(CoreError::InvalidScripts(format!(
                "directory {} does not exist",
                directory.display()
            )));
        }
        self.finish(self.path_for(request_id), directory.to_path_buf(), prior_state)
    }

    fn finish(
        &self,
        root: PathBuf,
        scripts_dir: PathBuf,
        prior_state: Option<&str>,
    ) -> CoreResult<PreparedWorkspace> {
        let script_files = list_script_files(&scripts_dir)?;
        if script_files.is_empty() {
            return Err(CoreError::InvalidScripts(format!(
                "no script files found in {}",
                scripts_dir.display()
            )));
        }

        if let Some(state) = prior_state.filter(|s| !s.trim().is_empty()) {
            std::fs::write(scripts_dir.join(STATE_FILE), state)?;
            debug!("Injected prior state");
        }

        info!(
            dir = %scripts_dir.display(),
            files = script_files.len(),
            "Workspace materialized"
        );
        Ok(PreparedWorkspace {
            root,
            scripts_dir,
            script_files,
        })
    }

    /// Remove a request's workspace. Failures are logged only.
    pub fn cleanup(&self, workspace: &PreparedWorkspace) {
        self.remove(&workspace.root);
    }

    pub fn cleanup_id(&self, request_id: Uuid) {
        self.remove(&self.path_for(request_id));
    }

    fn remove(&self, path: &Path) {
        if !path.starts_with(&self.root) || !path.exists() {
            return;
        }
        match std::fs::remove_dir_all(path) {
            Ok(()) => debug!(path = %path.display(), "Workspace removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

/// Read the state file terraform left behind, if any.
pub fn read_state(scripts_dir: &Path) -> Option<String> {
    let path = scripts_dir.join(STATE_FILE);
    match std::fs::read_to_string(&path) {
        Ok(state) => Some(state),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read state file");
            None
        }
    }
}

/// Regular files under `dir` as (`/`-separated relative name, path).
///
/// Hidden directories such as `.terraform` and `.git` are not descended.
fn walk_files(dir: &Path) -> impl Iterator<Item = (String, PathBuf)> + '_ {
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with('.'))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(move |e| {
            let relative = e.path().strip_prefix(dir).ok()?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some((name, e.into_path()))
        })
}

/// Every file under `dir` not in `excluding`, keyed by relative path.
pub fn read_generated_files(dir: &Path, excluding: &[String]) -> HashMap<String, String> {
    let excluded: HashSet<&str> = excluding.iter().map(String::as_str).collect();

    walk_files(dir)
        .filter(|(name, _)| !excluded.contains(name.as_str()))
        .filter_map(|(name, path)| match std::fs::read(&path) {
            Ok(bytes) => Some((name, String::from_utf8_lossy(&bytes).into_owned())),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping unreadable file");
                None
            }
        })
        .collect()
}

/// Whether terraform holds a state lock anywhere under `dir`, including a
/// repository sub-path.
pub fn holds_state_lock(dir: &Path) -> bool {
    dir.is_dir()
        && walk_files(dir).any(|(name, _)| {
            name.rsplit('/').next() == Some(STATE_LOCK_INFO_FILE)
        })
}

/// Files under `dir` by relative path, nested ones included, without the
/// state files.
fn list_script_files(dir: &Path) -> CoreResult<Vec<String>> {
    if !dir.is_dir() {
        return Err(CoreError::InvalidScripts(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let mut files: Vec<String> = walk_files(dir)
        .map(|(name, _)| name)
        .filter(|name| name != STATE_FILE && name != STATE_BACKUP_FILE)
        .collect();
    files.sort();
    Ok(files)
}

fn validate_relative(name: &str) -> CoreResult<()> {
    let path = Path::new(name);
    let ok = !name.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(())
    } else {
        Err(CoreError::InvalidScripts(format!("invalid script path '{}'", name)))
    }
}
