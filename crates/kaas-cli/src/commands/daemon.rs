//! HTTP daemon command.

use anyhow::Result;
use kaas_config::SystemConfig;
use tokio_util::sync::CancellationToken;

/// Run the build server, with `port` and `bind` overriding the config file.
pub async fn run(mut config: SystemConfig, port: Option<u16>, bind: Option<String>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(kaas_api::cancel_on_signal(shutdown.clone()));

    kaas_api::serve(config, shutdown).await
}
