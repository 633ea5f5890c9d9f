//! Durable storage for outcomes whose callback could not be delivered.
//!
//! Layout: `<root>/<requestId>/<requestId>.dat`, holding the outcome as JSON.
//! A stored outcome is handed out once; retrieval deletes it.

use std::path::PathBuf;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{RetrieveError, StoreResult};
use crate::models::{ExecutionOutcome, RefetchResult, RefetchState};
use crate::workspace::{holds_state_lock, WorkspaceManager};

const RESULT_FILE_SUFFIX: &str = "dat";

pub struct ResultStore {
    root: PathBuf,
    workspaces: WorkspaceManager,
    clean_workspace_after_deployment: bool,
}

impl ResultStore {
    pub fn new(
        root: impl Into<PathBuf>,
        workspaces: WorkspaceManager,
        clean_workspace_after_deployment: bool,
    ) -> Self {
        Self {
            root: root.into(),
            workspaces,
            clean_workspace_after_deployment,
        }
    }

    fn dir_for(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir_for(id)
            .join(format!("{}.{}", id, RESULT_FILE_SUFFIX))
    }

    pub fn serialize(outcome: &ExecutionOutcome) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(outcome)?)
    }

    pub fn deserialize(bytes: &[u8]) -> StoreResult<ExecutionOutcome> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Write an outcome under its request id.
    pub fn persist(&self, outcome: &ExecutionOutcome) -> StoreResult<PathBuf> {
        let dir = self.dir_for(outcome.request_id);
        std::fs::create_dir_all(&dir)?;

        let path = self.path_for(outcome.request_id);
        std::fs::write(&path, Self::serialize(outcome)?)?;

        info!(request_id = %outcome.request_id, path = %path.display(), "Result persisted");
        Ok(path)
    }

    /// Whether the request still looks like it is running.
    ///
    /// With workspace cleanup enabled the workspace's existence is the
    /// signal; otherwise terraform's state lock file anywhere inside it.
    pub fn is_in_progress(&self, id: Uuid) -> bool {
        let workspace = self.workspaces.path_for(id);
        if self.clean_workspace_after_deployment {
            workspace.is_dir()
        } else {
            holds_state_lock(&workspace)
        }
    }

    /// Take the stored outcome for `id`, deleting it.
    pub fn retrieve(&self, id: Uuid) -> Result<ExecutionOutcome, RetrieveError> {
        let path = self.path_for(id);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return if self.is_in_progress(id) {
                    Err(RetrieveError::InProgress(id))
                } else {
                    warn!(request_id = %id, "No stored result");
                    Err(RetrieveError::NotFound(id))
                };
            }
            Err(e) => {
                error!(request_id = %id, error = %e, "Failed to read stored result");
                return Err(RetrieveError::ParseFailed {
                    id,
                    reason: e.to_string(),
                });
            }
        };

        let outcome = Self::deserialize(&bytes).map_err(|e| {
            error!(request_id = %id, error = %e, "Stored result is corrupt");
            RetrieveError::ParseFailed {
                id,
                reason: e.to_string(),
            }
        })?;

        let dir = self.dir_for(id);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            warn!(path = %dir.display(), error = %e, "Failed to delete stored result");
        }
        info!(request_id = %id, "Stored result retrieved");
        Ok(outcome)
    }

    /// Resolve each id independently.
    pub fn retrieve_batch(&self, ids: &[Uuid]) -> Vec<RefetchResult> {
        ids.iter().map(|id| self.refetch(*id)).collect()
    }

    pub fn refetch(&self, id: Uuid) -> RefetchResult {
        match self.retrieve(id) {
            Ok(outcome) => RefetchResult {
                request_id: id,
                state: RefetchState::Ok,
                outcome: Some(outcome),
                error_message: None,
            },
            Err(e) => {
                let state = match e {
                    RetrieveError::NotFound(_) => RefetchState::NotFound,
                    RetrieveError::InProgress(_) => RefetchState::InProgress,
                    RetrieveError::ParseFailed { .. } => RefetchState::ParseFailed,
                };
                RefetchResult {
                    request_id: id,
                    state,
                    outcome: None,
                    error_message: Some(e.to_string()),
                }
            }
        }
    }
}
