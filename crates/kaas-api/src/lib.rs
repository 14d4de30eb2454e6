//! HTTP server for the KaaS build service.
//!
//! Exposes `POST /build` plus health endpoints. Each build runs on its own
//! task under a cancellation token that is tied to both the client
//! connection and server shutdown.

pub mod error;
pub mod routes;
pub mod state;

#[cfg(test)]
mod testing;

pub use state::AppState;

use anyhow::Context;
use axum::Router;
use kaas_config::SystemConfig;
use kaas_executor::{DockerImageBuilder, GitFetcher};
use kaas_scheduler::BuildOrchestrator;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the application with request tracing.
pub fn app(state: AppState) -> Router {
    routes::router(state).layer(TraceLayer::new_for_http())
}

/// Serve builds until `shutdown` is cancelled, then drain open connections.
pub async fn serve(config: SystemConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let fetcher = GitFetcher::new(config.git.binary.clone(), config.git.depth);
    let builder = DockerImageBuilder::new(config.build.pull_base_image)
        .context("Failed to connect to Docker")?;
    let orchestrator =
        BuildOrchestrator::from_config(&config, Arc::new(fetcher), Arc::new(builder));

    let state = AppState::new(Arc::new(orchestrator), shutdown.clone());
    let app = app(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        addr = %addr,
        work_dir = %config.workspace.dir.display(),
        "Starting build server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Build server stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
pub async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
