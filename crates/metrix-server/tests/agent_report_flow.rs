mod common;

use common::*;
use metrix_agent::dispatcher::Dispatcher;
use metrix_agent::transport::{GrpcTransport, HttpTransport, Transport};
use metrix_common::envelope::{Sealer, Signer};
use metrix_common::types::{MetricValue, RequestMetric};
use metrix_server::server;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct RunningServer {
    ctx: TestContext,
    http_address: String,
    grpc_address: String,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should stop within the grace period")
            .expect("server task should not panic")
            .expect("server should stop cleanly");
    }
}

async fn start(security: Security) -> RunningServer {
    let ctx = build_secured_context(security);
    let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let grpc = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_address = http.local_addr().unwrap().to_string();
    let grpc_address = grpc.local_addr().unwrap().to_string();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server::serve(
        ctx.state.clone(),
        http,
        Some(grpc),
        shutdown.clone(),
        Duration::from_secs(2),
    ));
    RunningServer {
        ctx,
        http_address,
        grpc_address,
        shutdown,
        handle,
    }
}

fn cycle(poll_count: i64) -> Vec<RequestMetric> {
    let mut items: Vec<RequestMetric> = (0..25)
        .map(|i| RequestMetric::gauge(format!("Gauge{i}"), f64::from(i) + 0.5))
        .collect();
    items.push(RequestMetric::counter("PollCount", poll_count));
    items
}

async fn report(transport: Arc<dyn Transport>, rate_limit: usize, rounds: &[i64]) {
    let mut dispatcher = Dispatcher::new(transport, rate_limit, 64);
    for poll_count in rounds {
        let report = dispatcher.dispatch(cycle(*poll_count)).await.unwrap();
        assert_eq!(report.delivered, 26);
        dispatcher.reset();
    }
    dispatcher.close().await.unwrap();
}

async fn assert_stored(server: &RunningServer, poll_count: i64) {
    let storage = &server.ctx.storage;
    assert_eq!(storage.get_all().await.unwrap().len(), 26);
    assert_eq!(
        storage.get("PollCount").await.unwrap().value(),
        MetricValue::Counter(poll_count)
    );
    assert_eq!(
        storage.get("Gauge7").await.unwrap().value(),
        MetricValue::Gauge(7.5)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn http_agent_reports_concurrently() {
    let server = start(Security::default()).await;
    let transport = HttpTransport::new(
        &server.http_address,
        Duration::from_secs(5),
        Sealer::default(),
    )
    .unwrap();

    report(Arc::new(transport), 4, &[5, 3]).await;
    assert_stored(&server, 8).await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn http_agent_with_full_envelope() {
    let server = start(Security {
        key: Some(TEST_KEY),
        decryptor: Some(decryptor()),
        subnet: Some("127.0.0.0/8"),
    })
    .await;
    let sealer = Sealer::new(Signer::new(TEST_KEY), Some(encryptor()));
    let transport =
        HttpTransport::new(&server.http_address, Duration::from_secs(5), sealer).unwrap();

    report(Arc::new(transport), 2, &[4]).await;
    assert_stored(&server, 4).await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn grpc_agent_with_signed_batches() {
    let server = start(Security {
        key: Some(TEST_KEY),
        subnet: Some("127.0.0.0/8"),
        ..Security::default()
    })
    .await;
    let sealer = Sealer::new(Signer::new(TEST_KEY), None);
    let transport =
        GrpcTransport::new(&server.grpc_address, Duration::from_secs(5), sealer).unwrap();

    report(Arc::new(transport), 3, &[2, 2, 2]).await;
    assert_stored(&server, 6).await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn grpc_agent_with_sealed_batches() {
    let server = start(Security {
        key: Some(TEST_KEY),
        decryptor: Some(decryptor()),
        ..Security::default()
    })
    .await;
    let sealer = Sealer::new(Signer::new(TEST_KEY), Some(encryptor()));
    let transport =
        GrpcTransport::new(&server.grpc_address, Duration::from_secs(5), sealer).unwrap();

    report(Arc::new(transport), 1, &[11]).await;
    assert_stored(&server, 11).await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wrong_key_fails_the_whole_cycle() {
    let server = start(Security {
        key: Some(TEST_KEY),
        ..Security::default()
    })
    .await;
    let sealer = Sealer::new(Signer::new("not-the-key"), None);
    let transport =
        HttpTransport::new(&server.http_address, Duration::from_secs(5), sealer).unwrap();

    let mut dispatcher = Dispatcher::new(Arc::new(transport), 2, 64);
    let err = dispatcher.dispatch(cycle(1)).await.unwrap_err();
    assert!(!err.is_partial());
    assert_eq!(err.undelivered().count(), 26);
    assert!(server.ctx.storage.get_all().await.unwrap().is_empty());
    server.stop().await;
}
