//! Listener startup and graceful shutdown.

use crate::app::build_http_app;
use crate::backend;
use crate::config::ServerConfig;
use crate::grpc::MetricServiceImpl;
use crate::state::AppState;
use anyhow::Context;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server as TonicServer;

/// Serves HTTP (and gRPC when a listener is given) until `shutdown` fires
/// or a listener fails, then waits at most `grace` for in-flight requests.
pub async fn serve(
    state: AppState,
    http: TcpListener,
    grpc: Option<TcpListener>,
    shutdown: CancellationToken,
    grace: Duration,
) -> anyhow::Result<()> {
    let mut servers: JoinSet<anyhow::Result<()>> = JoinSet::new();

    let app = build_http_app(state.clone());
    let http_shutdown = shutdown.clone();
    servers.spawn(async move {
        axum::serve(http, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(http_shutdown.cancelled_owned())
            .await
            .context("HTTP server")
    });

    if let Some(listener) = grpc {
        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|e| anyhow::anyhow!("gRPC listener: {e}"))?;
        let service = MetricServiceImpl::new(state).into_server();
        let grpc_shutdown = shutdown.clone();
        servers.spawn(async move {
            TonicServer::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(incoming, grpc_shutdown.cancelled_owned())
                .await
                .context("gRPC server")
        });
    }

    let mut result = Ok(());
    tokio::select! {
        _ = shutdown.cancelled() => {
            tracing::info!("Shutting down gracefully");
        }
        Some(joined) = servers.join_next() => {
            result = flatten(joined);
            if let Err(e) = &result {
                tracing::error!(error = %e, "Listener stopped unexpectedly");
            }
        }
    }
    shutdown.cancel();

    let drain = async {
        while let Some(joined) = servers.join_next().await {
            if let Err(e) = flatten(joined) {
                tracing::error!(error = %e, "Listener failed during shutdown");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, aborting listeners");
        servers.abort_all();
    }
    result
}

fn flatten(joined: Result<anyhow::Result<()>, tokio::task::JoinError>) -> anyhow::Result<()> {
    joined.context("listener task panicked")?
}

/// Full server lifecycle for `config`: open and restore storage, serve,
/// then save and close storage once the listeners are down.
pub async fn run(config: ServerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let storage = backend::open(&config.backend(), config.restore).await?;
    let state = AppState::from_config(&config, storage.clone())?;

    let http = TcpListener::bind(&config.http_address)
        .await
        .with_context(|| format!("binding HTTP listener {}", config.http_address))?;
    let grpc = if config.grpc_enabled() {
        Some(
            TcpListener::bind(&config.grpc_address)
                .await
                .with_context(|| format!("binding gRPC listener {}", config.grpc_address))?,
        )
    } else {
        tracing::info!("gRPC listener disabled");
        None
    };

    tracing::info!(
        http = %config.http_address,
        grpc = %config.grpc_address,
        backend = config.backend().name(),
        "Server started"
    );

    let saver = backend::spawn_saver(storage.clone(), config.store_interval(), shutdown.clone());
    let result = serve(state, http, grpc, shutdown.clone(), config.shutdown_grace()).await;

    if let Some(handle) = saver {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Snapshot task ended abnormally");
        }
    }
    backend::shutdown(storage.as_ref()).await;
    tracing::info!("Server stopped");
    result
}
