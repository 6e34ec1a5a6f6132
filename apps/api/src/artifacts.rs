//! Artifact Manager — workspace lifecycle and the final artifact.
//!
//! Each compilation gets a fresh `vitae-ws-*` directory under the configured
//! root. The directory lives in a `TempDir` guard: the happy path closes it
//! explicitly so a failed removal can be logged, and every other exit path
//! (error, timeout, cancellation, panic) removes it when the guard drops.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::PipelineError;

pub const WORKSPACE_PREFIX: &str = "vitae-ws-";

/// Final compiled document: bytes plus a generated filename, never a path.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactManager {
    root: PathBuf,
    max_artifact_bytes: usize,
}

impl ArtifactManager {
    pub fn new(root: impl Into<PathBuf>, max_artifact_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_artifact_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs `f` with an exclusively-owned workspace directory and turns the
    /// bytes it returns into an [`Artifact`]. The directory is gone when this returns.
    pub async fn with_workspace<F, Fut>(&self, f: F) -> Result<Artifact, PipelineError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<Vec<u8>, PipelineError>>,
    {
        let workspace = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|e| {
                PipelineError::Resource(format!(
                    "could not create workspace under {}: {e}",
                    self.root.display()
                ))
            })?;
        debug!(workspace = %workspace.path().display(), "Created workspace");

        let result = f(workspace.path().to_path_buf()).await;

        let path = workspace.path().to_path_buf();
        match tokio::task::spawn_blocking(move || workspace.close()).await {
            Ok(Ok(())) => debug!(workspace = %path.display(), "Removed workspace"),
            Ok(Err(e)) => warn!(workspace = %path.display(), error = %e, "Workspace cleanup failed"),
            Err(e) => warn!(workspace = %path.display(), error = %e, "Workspace cleanup task failed"),
        }

        let bytes = result?;
        if bytes.len() > self.max_artifact_bytes {
            return Err(PipelineError::Resource(format!(
                "artifact of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.max_artifact_bytes
            )));
        }

        Ok(Artifact {
            bytes,
            filename: format!("resume-{}.pdf", Uuid::new_v4()),
        })
    }

    /// Removes workspaces left behind by a previous process. Returns how many were removed.
    pub fn sweep_stale(&self) -> usize {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Cannot scan workspace root");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let is_workspace = entry.file_name().to_string_lossy().starts_with(WORKSPACE_PREFIX)
                && entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_workspace {
                continue;
            }
            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(workspace = %entry.path().display(), error = %e, "Failed to remove stale workspace"),
            }
        }

        if removed > 0 {
            info!(removed, "Swept stale workspaces");
        }
        removed
    }
}

/// Number of live workspace directories under `root`.
#[cfg(test)]
pub(crate) fn count_workspaces(root: &Path) -> usize {
    std::fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.file_name().to_string_lossy().starts_with(WORKSPACE_PREFIX))
                .count()
        })
        .unwrap_or(0)
}
