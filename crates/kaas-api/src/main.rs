//! KaaS build server.

use anyhow::Context;
use kaas_config::SystemConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SystemConfig::load(None).context("Failed to load system config")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(kaas_api::cancel_on_signal(shutdown.clone()));

    kaas_api::serve(config, shutdown).await
}
