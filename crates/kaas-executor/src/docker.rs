//! Local Docker image builder.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{Either, Full};
use kaas_core::builder::{BuildContext, ImageBuilder};
use kaas_core::fetcher::BUILD_DESCRIPTOR;
use kaas_core::image::image_name;
use kaas_core::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::context::create_context;

/// Build argument carrying the deploy config document as JSON.
pub const DEPLOY_CONFIG_ARG: &str = "KAAS_DEPLOY_CONFIG";
/// Build argument carrying the service config document as JSON.
pub const SERVICE_CONFIG_ARG: &str = "KAAS_SERVICE_CONFIG";

static FROM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*FROM\s+(?:--platform=\S+\s+)?(\S+)").expect("valid regex")
});

/// Image builder talking to the local Docker daemon.
pub struct DockerImageBuilder {
    docker: Docker,
    /// Pull the base image for the host platform before building.
    pull_base_image: bool,
}

impl DockerImageBuilder {
    /// Create a builder connected to the local Docker daemon.
    pub fn new(pull_base_image: bool) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self::with_client(docker, pull_base_image))
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker, pull_base_image: bool) -> Self {
        Self {
            docker,
            pull_base_image,
        }
    }

    /// Pull `image` for the host platform, failing if the registry has no
    /// variant for it.
    async fn pull_base(&self, image: &str) -> Result<()> {
        let platform = host_platform();
        info!(image = %image, platform = %platform, "Pulling base image");

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image: image.to_string(),
            platform: platform.clone(),
            ..Default::default()
        };

        #[allow(deprecated)]
        let mut stream = self
            .docker
            .create_image(Some(options), None, None::<DockerCredentials>);
        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(Error::BuildFailed(format!(
                        "image '{}' is not available for {}: {}",
                        image,
                        platform,
                        docker_diagnostic(e)
                    )));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ImageBuilder for DockerImageBuilder {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| Error::Internal(format!("docker unavailable: {}", e)))
    }

    async fn build(&self, ctx: BuildContext<'_>) -> Result<String> {
        let image = image_name(ctx.request, ctx.deploy.document());

        if self.pull_base_image {
            let dockerfile = tokio::fs::read_to_string(ctx.root.join(BUILD_DESCRIPTOR)).await?;
            match base_image(&dockerfile) {
                // `scratch` is not pullable and `${ARG}` bases resolve at build time.
                Some(base) if base != "scratch" && !base.contains('$') => {
                    self.pull_base(&base).await?
                }
                Some(_) => {}
                None => warn!("No FROM line found in Dockerfile, skipping base image pull"),
            }
        }

        let root = ctx.root.to_path_buf();
        let context = tokio::task::spawn_blocking(move || create_context(&root))
            .await
            .map_err(|e| Error::Internal(format!("build context task failed: {}", e)))??;

        let service_json = ctx
            .service
            .map(|s| s.to_json_string())
            .unwrap_or_else(|| "{}".to_string());
        let buildargs = HashMap::from([
            (DEPLOY_CONFIG_ARG.to_string(), ctx.deploy.to_json_string()),
            (SERVICE_CONFIG_ARG.to_string(), service_json),
        ]);
        let labels = HashMap::from([
            ("kaas.repo".to_string(), ctx.request.repo_url().to_string()),
            (
                "kaas.branch".to_string(),
                ctx.request.repo_branch().to_string(),
            ),
        ]);

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: BUILD_DESCRIPTOR.to_string(),
            t: image.clone(),
            buildargs,
            labels,
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        info!(image = %image, build_id = %ctx.request.id(), "Building image");

        let body = Full::new(Bytes::from(context));
        #[allow(deprecated)]
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            let output = msg.map_err(|e| Error::BuildFailed(docker_diagnostic(e)))?;

            if let Some(detail) = output.error_detail {
                let message = detail
                    .message
                    .or(output.error)
                    .unwrap_or_else(|| "unknown build error".to_string());
                return Err(Error::BuildFailed(message));
            }
            if let Some(error) = output.error {
                return Err(Error::BuildFailed(error));
            }
            if let Some(line) = output.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(image = %image, "{}", line);
                }
            }
        }

        info!(image = %image, "Image built successfully");
        Ok(image)
    }
}

/// Base image named by the first `FROM` instruction.
pub fn base_image(dockerfile: &str) -> Option<String> {
    FROM_LINE
        .captures(dockerfile)
        .map(|caps| caps[1].to_string())
}

/// The daemon's diagnostic text, without bollard's own wrapping.
fn docker_diagnostic(err: bollard::errors::Error) -> String {
    match err {
        bollard::errors::Error::DockerStreamError { error } => error,
        bollard::errors::Error::DockerResponseServerError { message, .. } => message,
        other => other.to_string(),
    }
}

/// `os/arch` of this host in Docker's naming.
pub fn host_platform() -> String {
    let arch = match std::env::consts::ARCH {
        "x86" => "386",
        "x86_64" => "amd64",
        "arm" => "arm",
        "aarch64" => "arm64",
        other => other,
    };
    format!("linux/{}", arch)
}


/// Integration tests that require Docker to be running.
/// Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use kaas_core::{BuildRequest, ConfigRef, ConfigSource, ErrorKind, ResolvedConfig};
    use serde_json::Map;

    fn deploy() -> ResolvedConfig {
        ResolvedConfig::new(Map::new(), ConfigSource::Inline)
    }

    fn request() -> BuildRequest {
        BuildRequest::new(
            "https://example.com/kaas-it",
            Some("main".to_string()),
            ConfigRef::Default,
            ConfigRef::Default,
        )
        .unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_build_simple_image() {
        let builder = DockerImageBuilder::new(true).unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Dockerfile"),
            "FROM alpine:3.20\nARG KAAS_DEPLOY_CONFIG\nRUN echo \"$KAAS_DEPLOY_CONFIG\"\n",
        )
        .unwrap();

        let req = request();
        let deploy = deploy();
        let image = builder
            .build(BuildContext {
                request: &req,
                root: dir.path(),
                deploy: &deploy,
                service: None,
            })
            .await
            .expect("build should succeed");
        assert_eq!(image, "kaas-it:main");

        let _ = builder.docker.remove_image(&image, None::<bollard::query_parameters::RemoveImageOptions>, None).await;
    }

    #[tokio::test]
    #[ignore]
    async fn test_failing_build_reports_diagnostic() {
        let builder = DockerImageBuilder::new(false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Dockerfile"),
            "FROM alpine:3.20\nRUN exit 3\n",
        )
        .unwrap();

        let req = request();
        let deploy = deploy();
        let err = builder
            .build(BuildContext {
                request: &req,
                root: dir.path(),
                deploy: &deploy,
                service: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BuildFailed);
        assert!(err.to_string().contains("exit 3"));
    }
}
