#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use flate2::write::GzEncoder;
use flate2::Compression;
use metrix_common::envelope::{Decryptor, Encryptor, Opener, Signer, TrustedSubnet};
use metrix_server::app;
use metrix_server::metric_service::MetricService;
use metrix_server::state::AppState;
use metrix_common::types::Record;
use metrix_storage::mem::MemStorage;
use metrix_storage::{Storage, StorageError};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::io::Write;
use std::sync::{Arc, OnceLock};
use tower::util::ServiceExt;

pub const TEST_KEY: &str = "test-secret";

pub struct TestContext {
    pub storage: Arc<dyn Storage>,
    pub state: AppState,
    pub app: axum::Router,
}

/// Envelope settings for a test server.
#[derive(Default)]
pub struct Security {
    pub key: Option<&'static str>,
    pub decryptor: Option<Decryptor>,
    pub subnet: Option<&'static str>,
}

/// Serves reads from an empty map and fails every write.
#[derive(Default)]
pub struct ReadOnlyStorage {
    inner: MemStorage,
}

fn read_only() -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "read-only storage",
    ))
}

#[async_trait]
impl Storage for ReadOnlyStorage {
    async fn push(&self, _name: &str, _record: Record) -> metrix_storage::Result<()> {
        Err(read_only())
    }

    async fn push_batch(&self, _records: Vec<Record>) -> metrix_storage::Result<()> {
        Err(read_only())
    }

    async fn get(&self, name: &str) -> metrix_storage::Result<Record> {
        self.inner.get(name).await
    }

    async fn get_all(&self) -> metrix_storage::Result<Vec<Record>> {
        self.inner.get_all().await
    }

    async fn close(&self) -> metrix_storage::Result<()> {
        Ok(())
    }
}

pub fn build_test_context() -> TestContext {
    build_secured_context(Security::default())
}

pub fn build_secured_context(security: Security) -> TestContext {
    build_context_with_storage(Arc::new(MemStorage::new()), security)
}

pub fn build_context_with_storage(storage: Arc<dyn Storage>, security: Security) -> TestContext {
    let opener = Opener::new(security.key.and_then(Signer::new), security.decryptor);
    let subnet = security
        .subnet
        .map(|cidr| TrustedSubnet::parse(cidr).expect("test subnet should parse"));
    let state = AppState::new(MetricService::new(storage.clone()), opener, subnet);
    let app = app::build_http_app(state.clone());
    TestContext {
        storage,
        state,
        app,
    }
}

/// One 1024-bit key pair shared by the whole test binary.
pub fn key_pair() -> (RsaPrivateKey, RsaPublicKey) {
    static KEYS: OnceLock<RsaPrivateKey> = OnceLock::new();
    let private = KEYS
        .get_or_init(|| {
            RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("key generation should work")
        })
        .clone();
    let public = RsaPublicKey::from(&private);
    (private, public)
}

pub fn encryptor() -> Encryptor {
    Encryptor::new(key_pair().1).unwrap()
}

pub fn decryptor() -> Decryptor {
    Decryptor::new(key_pair().0)
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write should work");
    encoder.finish().expect("gzip finish should work")
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: String,
}

pub async fn send(app: &axum::Router, request: Request<Body>) -> TestResponse {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).to_string(),
    }
}

pub async fn get(app: &axum::Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, request).await
}

pub async fn post(app: &axum::Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, request).await
}

pub async fn post_json(app: &axum::Router, uri: &str, json: &str) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .expect("request should build");
    send(app, request).await
}

/// Posts `body` to `/updates` with the given extra headers.
pub async fn post_batch(
    app: &axum::Router,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> TestResponse {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/updates")
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body)).expect("request should build");
    send(app, request).await
}
