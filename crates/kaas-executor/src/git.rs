//! Git fetcher: clones a repository at a branch with the `git` CLI.

use async_trait::async_trait;
use kaas_core::fetcher::RepositoryFetcher;
use kaas_core::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};
use url::Url;

/// Fetcher backed by the `git` command line client.
///
/// Only public repositories are supported: git is never allowed to prompt
/// for credentials, so a private repository fails fast as unreachable.
pub struct GitFetcher {
    binary: String,
    /// Shallow clone depth (`None` for a full clone).
    depth: Option<u32>,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new("git", Some(1))
    }
}

impl GitFetcher {
    pub fn new(binary: impl Into<String>, depth: Option<u32>) -> Self {
        Self {
            binary: binary.into(),
            depth,
        }
    }

    fn clone_command(&self, repo_url: &str, branch: &str, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("clone")
            .arg("--single-branch")
            .arg("--branch")
            .arg(branch);
        if let Some(depth) = self.depth {
            cmd.arg("--depth").arg(depth.to_string());
        }
        cmd.arg("--")
            .arg(repo_url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RepositoryFetcher for GitFetcher {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn clone_repo(&self, repo_url: &str, branch: &str, dest: &Path) -> Result<()> {
        info!(
            repo = %redact_url(repo_url),
            branch = %branch,
            path = %dest.display(),
            "Cloning repository"
        );

        let output = self
            .clone_command(repo_url, branch, dest)
            .output()
            .await
            .map_err(|e| Error::Internal(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = redact_stderr(&stderr, repo_url);
            warn!(repo = %redact_url(repo_url), branch = %branch, "Git clone failed");
            return Err(classify_clone_failure(&stderr, branch));
        }

        info!(path = %dest.display(), "Repository cloned successfully");
        Ok(())
    }
}

/// Map git's stderr onto the error taxonomy.
pub fn classify_clone_failure(stderr: &str, branch: &str) -> Error {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();

    let branch_missing = [
        "remote branch",
        "couldn't find remote ref",
        "could not find remote branch",
    ];
    if branch_missing.iter().any(|p| lower.contains(p)) {
        return Error::BranchNotFound {
            branch: branch.to_string(),
        };
    }

    let network = [
        "could not resolve host",
        "timed out",
        "connection refused",
        "connection reset",
        "failed to connect",
        "network is unreachable",
        "early eof",
        "the remote end hung up unexpectedly",
    ];
    if network.iter().any(|p| lower.contains(p)) {
        return Error::FetchFailed(message);
    }

    // "repository not found", auth prompts refused, "does not appear to be a
    // git repository", "access denied" and anything unrecognised.
    Error::RepoUnreachable(message)
}

/// Strip a password from a URL before it is logged.
fn redact_url(repo_url: &str) -> String {
    match Url::parse(repo_url) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("[REDACTED]"));
            url.to_string()
        }
        _ => repo_url.to_string(),
    }
}

fn redact_stderr(stderr: &str, repo_url: &str) -> String {
    match Url::parse(repo_url).ok().and_then(|u| u.password().map(String::from)) {
        Some(password) if !password.is_empty() => stderr.replace(&password, "[REDACTED]"),
        _ => stderr.to_string(),
    }
}
