use anyhow::Result;
use metrix_agent::agent::Agent;
use metrix_agent::config::AgentConfig;
use metrix_agent::dispatcher::Dispatcher;
use metrix_agent::transport;
use metrix_collector::Sampler;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("metrix_agent=info".parse()?)
                .add_directive("metrix_collector=info".parse()?),
        )
        .init();

    let config_path = std::env::args().nth(1);
    let config = AgentConfig::resolve(config_path.as_deref())?;
    tracing::info!(
        server = %config.server_address,
        transport = ?config.transport,
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        rate_limit = config.rate_limit,
        signed = !config.key.is_empty(),
        encrypted = !config.crypto_key.is_empty(),
        "metrix-agent starting"
    );

    let transport = transport::from_config(&config)?;
    let dispatcher = Dispatcher::new(transport, config.rate_limit, config.queue_capacity);
    let sampler = Sampler::with_default_collectors()?;
    let agent = Agent::new(
        sampler,
        dispatcher,
        config.poll_interval(),
        config.report_interval(),
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutting down gracefully");
                trigger.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    agent.run(shutdown).await;
    Ok(())
}
