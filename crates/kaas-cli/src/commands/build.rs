//! One-shot build command.

use anyhow::{Context, Result};
use kaas_config::SystemConfig;
use kaas_core::{BuildRequest, ConfigRef};
use kaas_executor::{DockerImageBuilder, GitFetcher};
use kaas_scheduler::BuildOrchestrator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build `repo_url` at `branch` and print the image name on stdout.
pub async fn run(
    config: SystemConfig,
    repo_url: String,
    branch: String,
    deploy_config: Option<String>,
    service_config: Option<String>,
) -> Result<()> {
    let request = BuildRequest::new(
        repo_url,
        Some(branch),
        ConfigRef::from_path_arg(deploy_config),
        ConfigRef::from_path_arg(service_config),
    )?;

    let fetcher = GitFetcher::new(config.git.binary.clone(), config.git.depth);
    let builder = DockerImageBuilder::new(config.build.pull_base_image)
        .context("Failed to connect to Docker")?;
    let orchestrator =
        BuildOrchestrator::from_config(&config, Arc::new(fetcher), Arc::new(builder));

    let cancel = CancellationToken::new();
    tokio::spawn(kaas_api::cancel_on_signal(cancel.clone()));

    let image = orchestrator.submit(request, cancel).await?;
    println!("{}", image);
    Ok(())
}
