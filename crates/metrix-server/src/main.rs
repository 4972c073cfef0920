use anyhow::Result;
use metrix_server::config::ServerConfig;
use metrix_server::server;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("metrix_server=info".parse()?)
                .add_directive("metrix_storage=info".parse()?),
        )
        .init();

    let config_path = std::env::args().nth(1);
    let config = ServerConfig::resolve(config_path.as_deref())?;
    tracing::info!(
        http = %config.http_address,
        grpc = %config.grpc_address,
        store_interval_secs = config.store_interval_secs,
        restore = config.restore,
        signed = !config.key.is_empty(),
        encrypted = !config.crypto_key.is_empty(),
        trusted_subnet = %config.trusted_subnet,
        "metrix-server starting"
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => trigger.cancel(),
            Err(e) => tracing::warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    server::run(config, shutdown).await
}
