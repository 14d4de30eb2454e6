//! Per-request build workspaces.
//!
//! A [`Workspace`] is a directory owned by exactly one build request. Its
//! name comes from a fresh [`WorkspaceId`] and it is created with
//! `create_dir`, so an existing directory is an error rather than something
//! to reuse. Dropping the workspace removes the directory, which makes
//! cleanup run on every exit path of the pipeline: errors, early returns,
//! panics and cancelled futures alike.

use std::future::Future;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Error, Result, WorkspaceId};

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "kaas-build-";

/// Lifecycle of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    /// Directory exists and is empty.
    Acquired,
    /// A repository has been fetched into it.
    Populated,
    /// Directory has been removed.
    Disposed,
}

#[derive(Debug)]
pub struct Workspace {
    id: WorkspaceId,
    root: PathBuf,
    state: WorkspaceState,
}

impl Workspace {
    /// Allocate a fresh workspace directory under `work_dir`.
    pub fn acquire(work_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(work_dir)?;

        let id = WorkspaceId::new();
        let root = work_dir.join(format!("{}{}", WORKSPACE_PREFIX, id));
        std::fs::create_dir(&root).map_err(|e| {
            Error::Internal(format!(
                "failed to create workspace {}: {}",
                root.display(),
                e
            ))
        })?;

        debug!(workspace = %id, path = %root.display(), "Acquired workspace");

        Ok(Self {
            id,
            root,
            state: WorkspaceState::Acquired,
        })
    }

    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> WorkspaceState {
        self.state
    }

    /// Fill the workspace. Only an empty, freshly acquired workspace can be
    /// populated; a failed fill leaves it `Acquired` but it must not be
    /// filled again.
    pub async fn populate<F, Fut>(&mut self, fill: F) -> Result<()>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.state != WorkspaceState::Acquired {
            return Err(Error::Internal(format!(
                "workspace {} cannot be populated in state {:?}",
                self.id, self.state
            )));
        }

        let is_empty = std::fs::read_dir(&self.root)?.next().is_none();
        if !is_empty {
            return Err(Error::Internal(format!(
                "workspace {} was partially populated by an earlier attempt",
                self.id
            )));
        }

        fill(self.root.clone()).await?;
        self.state = WorkspaceState::Populated;
        Ok(())
    }

    /// Remove the workspace directory. Safe to call more than once.
    pub fn dispose(&mut self) -> Result<()> {
        if self.state == WorkspaceState::Disposed {
            return Ok(());
        }

        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Internal(format!(
                    "failed to remove workspace {}: {}",
                    self.root.display(),
                    e
                )));
            }
        }

        self.state = WorkspaceState::Disposed;
        debug!(workspace = %self.id, "Disposed workspace");
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!(workspace = %self.id, error = %e, "Workspace cleanup failed");
        }
    }
}
