//! Stub fetcher and builder for route tests.

use async_trait::async_trait;
use kaas_config::ConfigResolver;
use kaas_config::system::ConfigPaths;
use kaas_core::builder::{BuildContext, ImageBuilder};
use kaas_core::fetcher::RepositoryFetcher;
use kaas_core::image::image_name;
use kaas_core::{Error, Result};
use kaas_scheduler::{BuildOrchestrator, OrchestratorSettings};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::AppState;

/// Writes a fixed set of files in place of a clone.
pub struct StubFetcher {
    files: Vec<(&'static str, &'static str)>,
}

impl StubFetcher {
    pub fn with_files(files: Vec<(&'static str, &'static str)>) -> Self {
        Self { files }
    }

    /// A repository with a Dockerfile and both default config files.
    pub fn complete() -> Self {
        Self::with_files(vec![
            ("Dockerfile", "FROM alpine:3.20\n"),
            ("kaas.deploy.yml", "spec:\n  replicas: 1\n"),
            ("kaas.service.yml", "name: app\n"),
        ])
    }
}

#[async_trait]
impl RepositoryFetcher for StubFetcher {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn clone_repo(&self, _repo_url: &str, _branch: &str, dest: &Path) -> Result<()> {
        for (name, content) in &self.files {
            std::fs::write(dest.join(name), content)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct StubBuilder {
    pub failure: Option<&'static str>,
    pub unhealthy: bool,
    pub delay: Duration,
    /// Notified when a build starts.
    pub started: Arc<Notify>,
    /// Set when a build is dropped before it finishes.
    pub abandoned: Arc<AtomicBool>,
}

/// Marks a build abandoned unless disarmed first.
struct AbandonGuard {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ImageBuilder for StubBuilder {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn ping(&self) -> Result<()> {
        if self.unhealthy {
            Err(Error::Internal("docker unavailable: connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn build(&self, ctx: BuildContext<'_>) -> Result<String> {
        let mut guard = AbandonGuard {
            flag: Arc::clone(&self.abandoned),
            armed: true,
        };
        self.started.notify_one();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        guard.armed = false;

        match self.failure {
            Some(message) => Err(Error::BuildFailed(message.to_string())),
            None => Ok(image_name(ctx.request, ctx.deploy.document())),
        }
    }
}

pub fn app_state(fetcher: StubFetcher, builder: StubBuilder, work_dir: &Path) -> AppState {
    let orchestrator = BuildOrchestrator::new(
        Arc::new(fetcher),
        Arc::new(builder),
        ConfigResolver::new(ConfigPaths::default()),
        OrchestratorSettings {
            work_dir: work_dir.to_path_buf(),
            clone_timeout: Duration::from_secs(30),
            build_timeout: Duration::from_secs(30),
            max_concurrent: 2,
            fetch_retries: 0,
        },
    );
    AppState::new(Arc::new(orchestrator), CancellationToken::new())
}
