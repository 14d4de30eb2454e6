//! Repository fetcher trait.
//!
//! Fetchers clone a repository at a branch into a workspace. The build
//! contract check (a `Dockerfile` at the repository root) is shared by every
//! implementation through [`RepositoryFetcher::fetch`].

use async_trait::async_trait;
use std::path::Path;

use crate::{Error, Result, Workspace};

/// Path of the build descriptor, relative to the repository root.
pub const BUILD_DESCRIPTOR: &str = "Dockerfile";

#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Name of this fetcher.
    fn name(&self) -> &'static str;

    /// Clone `repo_url` at `branch` into the empty directory `dest`.
    async fn clone_repo(&self, repo_url: &str, branch: &str, dest: &Path) -> Result<()>;

    /// Populate the workspace and validate the build contract.
    async fn fetch(&self, repo_url: &str, branch: &str, workspace: &mut Workspace) -> Result<()> {
        workspace
            .populate(|root| async move { self.clone_repo(repo_url, branch, &root).await })
            .await?;
        verify_build_descriptor(workspace.root())
    }
}

/// Check that `root` contains a regular `Dockerfile`.
pub fn verify_build_descriptor(root: &Path) -> Result<()> {
    if root.join(BUILD_DESCRIPTOR).is_file() {
        Ok(())
    } else {
        Err(Error::MissingBuildDescriptor {
            path: format!("/{}", BUILD_DESCRIPTOR),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, WorkspaceState};

    struct FakeFetcher {
        files: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl RepositoryFetcher for FakeFetcher {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn clone_repo(&self, _repo_url: &str, _branch: &str, dest: &Path) -> Result<()> {
            for (path, content) in &self.files {
                std::fs::write(dest.join(path), content)?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fetch_with_dockerfile() {
        let base = tempfile::tempdir().unwrap();
        let mut ws = Workspace::acquire(base.path()).unwrap();
        let fetcher = FakeFetcher {
            files: vec![("Dockerfile", "FROM alpine")],
        };

        fetcher
            .fetch("https://example.com/repo", "main", &mut ws)
            .await
            .unwrap();
        assert_eq!(ws.state(), WorkspaceState::Populated);
    }

    #[tokio::test]
    async fn test_fetch_without_dockerfile() {
        let base = tempfile::tempdir().unwrap();
        let mut ws = Workspace::acquire(base.path()).unwrap();
        let fetcher = FakeFetcher {
            files: vec![("README.md", "# hi")],
        };

        let err = fetcher
            .fetch("https://example.com/repo", "main", &mut ws)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingBuildDescriptor);
        assert!(err.to_string().contains("/Dockerfile"));
    }

    #[test]
    fn test_dockerfile_directory_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Dockerfile")).unwrap();
        assert!(verify_build_descriptor(dir.path()).is_err());
    }
}
