//! Build orchestrator - runs one request through fetch, resolve and build.

use kaas_config::{ConfigResolver, SystemConfig};
use kaas_core::builder::{BuildContext, ImageBuilder};
use kaas_core::fetcher::RepositoryFetcher;
use kaas_core::{BuildRequest, Error, ResolvedConfig, Result, Workspace};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Outcome of a build: the image name, or the first failure.
pub type BuildResult = Result<String>;

/// Limits and locations the orchestrator runs with.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Directory under which workspaces are allocated.
    pub work_dir: PathBuf,
    pub clone_timeout: Duration,
    pub build_timeout: Duration,
    pub max_concurrent: usize,
    /// Extra fetch attempts after a network failure.
    pub fetch_retries: u32,
}

impl From<&SystemConfig> for OrchestratorSettings {
    fn from(config: &SystemConfig) -> Self {
        Self {
            work_dir: config.workspace.dir.clone(),
            clone_timeout: config.git.clone_timeout,
            build_timeout: config.build.timeout,
            max_concurrent: config.build.max_concurrent,
            fetch_retries: config.git.fetch_retries,
        }
    }
}

/// Runs build requests. Each request gets its own workspace; nothing is
/// shared between requests except the fetcher, the builder and the
/// concurrency permits.
pub struct BuildOrchestrator {
    fetcher: Arc<dyn RepositoryFetcher>,
    builder: Arc<dyn ImageBuilder>,
    resolver: ConfigResolver,
    settings: OrchestratorSettings,
    permits: Arc<Semaphore>,
}

impl BuildOrchestrator {
    pub fn new(
        fetcher: Arc<dyn RepositoryFetcher>,
        builder: Arc<dyn ImageBuilder>,
        resolver: ConfigResolver,
        settings: OrchestratorSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        Self {
            fetcher,
            builder,
            resolver,
            settings,
            permits,
        }
    }

    /// Create an orchestrator from the system configuration.
    pub fn from_config(
        config: &SystemConfig,
        fetcher: Arc<dyn RepositoryFetcher>,
        builder: Arc<dyn ImageBuilder>,
    ) -> Self {
        Self::new(
            fetcher,
            builder,
            ConfigResolver::new(config.configs.clone()),
            OrchestratorSettings::from(config),
        )
    }

    pub fn builder(&self) -> &Arc<dyn ImageBuilder> {
        &self.builder
    }

    /// Number of builds currently holding a permit.
    pub fn active_builds(&self) -> usize {
        self.settings.max_concurrent.max(1) - self.permits.available_permits()
    }

    /// Run a build to completion.
    ///
    /// Cancelling `cancel` abandons the build at its next await point; the
    /// workspace is removed either way.
    pub async fn submit(&self, request: BuildRequest, cancel: CancellationToken) -> BuildResult {
        let span = info_span!(
            "build",
            build_id = %request.id(),
            repo = %request.repo_url(),
            branch = %request.repo_branch()
        );

        async move {
            info!("Build requested");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = self.run(&request) => result,
            };

            match &result {
                Ok(image) => info!(image = %image, "Build succeeded"),
                Err(e) if e.is_client_error() => warn!(error = %e, "Build rejected"),
                Err(Error::Cancelled) => info!("Build cancelled"),
                Err(e) => error!(kind = ?e.kind(), error = %e, "Build failed"),
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Run a build on its own task.
    pub fn spawn(
        self: &Arc<Self>,
        request: BuildRequest,
        cancel: CancellationToken,
    ) -> JoinHandle<BuildResult> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.submit(request, cancel).await })
    }

    async fn run(&self, request: &BuildRequest) -> BuildResult {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("build permits closed".to_string()))?;

        let workspace = self.fetch_into_workspace(request).await?;
        let result = self.build_in(request, workspace.root()).await;
        release(workspace).await;
        result
    }

    /// Acquire a workspace and fetch the repository into it. Network
    /// failures are retried on a fresh workspace.
    async fn fetch_into_workspace(&self, request: &BuildRequest) -> Result<Workspace> {
        let mut attempt = 0;

        loop {
            let work_dir = self.settings.work_dir.clone();
            let mut workspace = tokio::task::spawn_blocking(move || Workspace::acquire(&work_dir))
                .await
                .map_err(|e| Error::Internal(format!("workspace task failed: {}", e)))??;

            debug!(
                workspace = %workspace.id(),
                fetcher = self.fetcher.name(),
                attempt,
                "Fetching repository"
            );

            let fetch = self
                .fetcher
                .fetch(request.repo_url(), request.repo_branch(), &mut workspace);
            let error = match timeout(self.settings.clone_timeout, fetch).await {
                Ok(Ok(())) => return Ok(workspace),
                Ok(Err(e)) => e,
                Err(_) => Error::Timeout {
                    stage: "clone",
                    after: self.settings.clone_timeout,
                },
            };
            release(workspace).await;

            match error {
                Error::FetchFailed(message) if attempt < self.settings.fetch_retries => {
                    attempt += 1;
                    warn!(attempt, error = %message, "Fetch failed, retrying");
                }
                error => return Err(error),
            }
        }
    }

    async fn build_in(&self, request: &BuildRequest, root: &Path) -> BuildResult {
        let (deploy, service) = self.resolve_configs(request, root).await?;

        let ctx = BuildContext {
            request,
            root,
            deploy: &deploy,
            service: service.as_ref(),
        };

        debug!(builder = self.builder.name(), "Starting image build");
        timeout(self.settings.build_timeout, self.builder.build(ctx))
            .await
            .map_err(|_| Error::Timeout {
                stage: "build",
                after: self.settings.build_timeout,
            })?
    }

    /// Resolve deploy then service config. A deploy failure stops before the
    /// service config is looked at.
    async fn resolve_configs(
        &self,
        request: &BuildRequest,
        root: &Path,
    ) -> Result<(ResolvedConfig, Option<ResolvedConfig>)> {
        let resolver = self.resolver.clone();
        let deploy_ref = request.deploy_config().clone();
        let service_ref = request.service_config().clone();
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let deploy = resolver.resolve_deploy(&deploy_ref, &root)?;
            let service = resolver.resolve_service(&service_ref, &root)?;
            Ok((deploy, service))
        })
        .await
        .map_err(|e| Error::Internal(format!("config resolution task failed: {}", e)))?
    }
}

/// Remove a workspace off the async runtime. Removal errors are logged, not
/// returned: the build outcome has already been decided.
async fn release(workspace: Workspace) {
    let id = workspace.id();
    let removed = tokio::task::spawn_blocking(move || {
        let mut workspace = workspace;
        workspace.dispose()
    })
    .await;

    match removed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(workspace = %id, error = %e, "Workspace cleanup failed"),
        Err(e) => warn!(workspace = %id, error = %e, "Workspace cleanup task failed"),
    }
}
