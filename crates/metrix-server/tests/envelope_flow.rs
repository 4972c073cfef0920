mod common;

use axum::http::StatusCode;
use common::*;
use metrix_common::envelope::{Sealer, Signer, HASH_HEADER, REAL_IP_HEADER};
use metrix_common::types::{MetricValue, RequestMetric};

fn batch() -> Vec<RequestMetric> {
    vec![
        RequestMetric::counter("PollCount", 2),
        RequestMetric::gauge("RandomValue", 0.5),
        RequestMetric::counter("PollCount", 3),
    ]
}

fn signing_sealer() -> Sealer {
    Sealer::new(Signer::new(TEST_KEY), None)
}

#[tokio::test]
async fn signed_batch_is_accepted() {
    let ctx = build_secured_context(Security {
        key: Some(TEST_KEY),
        ..Security::default()
    });
    let sealed = signing_sealer().seal(&batch()).unwrap();
    let hash = sealed.hash.unwrap();

    let res = post_batch(
        &ctx.app,
        sealed.body,
        &[("Content-Encoding", "gzip"), (HASH_HEADER, hash.as_str())],
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        ctx.storage.get("PollCount").await.unwrap().value(),
        MetricValue::Counter(5)
    );
}

#[tokio::test]
async fn wrong_or_missing_signature_is_rejected() {
    let ctx = build_secured_context(Security {
        key: Some(TEST_KEY),
        ..Security::default()
    });
    let sealed = signing_sealer().seal(&batch()).unwrap();
    let forged = Sealer::new(Signer::new("other-key"), None)
        .sign(&batch())
        .unwrap()
        .unwrap();

    let res = post_batch(
        &ctx.app,
        sealed.body.clone(),
        &[("Content-Encoding", "gzip"), (HASH_HEADER, forged.as_str())],
    )
    .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = post_batch(&ctx.app, sealed.body.clone(), &[("Content-Encoding", "gzip")]).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = post_batch(
        &ctx.app,
        sealed.body,
        &[("Content-Encoding", "gzip"), (HASH_HEADER, "zz-not-hex")],
    )
    .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    assert!(ctx.storage.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn single_updates_are_not_signed() {
    let ctx = build_secured_context(Security {
        key: Some(TEST_KEY),
        subnet: Some("10.0.0.0/8"),
        ..Security::default()
    });
    let res = post(&ctx.app, "/update/counter/PollCount/1").await;
    assert_eq!(res.status, StatusCode::OK);
    let res = post_json(&ctx.app, "/update", r#"{"id":"G","type":"gauge","value":1}"#).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn trusted_subnet_gates_batches() {
    let ctx = build_secured_context(Security {
        subnet: Some("192.168.1.0/24"),
        ..Security::default()
    });
    let body = serde_json::to_vec(&batch()).unwrap();

    let res = post_batch(&ctx.app, body.clone(), &[(REAL_IP_HEADER, "10.1.2.3")]).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let res = post_batch(&ctx.app, body.clone(), &[]).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let res = post_batch(&ctx.app, body.clone(), &[(REAL_IP_HEADER, "garbage")]).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(ctx.storage.get_all().await.unwrap().is_empty());

    let res = post_batch(&ctx.app, body, &[(REAL_IP_HEADER, "192.168.1.77")]).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(ctx.storage.get_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn encrypted_and_signed_batch_round_trips() {
    let ctx = build_secured_context(Security {
        key: Some(TEST_KEY),
        decryptor: Some(decryptor()),
        ..Security::default()
    });
    let sealer = Sealer::new(Signer::new(TEST_KEY), Some(encryptor()));
    let mut items = batch();
    // Enough items to span several RSA blocks.
    items.extend((0..40).map(|i| RequestMetric::gauge(format!("Gauge{i}"), i as f64 * 1.5)));
    let sealed = sealer.seal(&items).unwrap();
    let hash = sealed.hash.unwrap();

    let res = post_batch(
        &ctx.app,
        sealed.body,
        &[("Content-Encoding", "gzip"), (HASH_HEADER, hash.as_str())],
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(ctx.storage.get_all().await.unwrap().len(), 42);
    assert_eq!(
        ctx.storage.get("Gauge3").await.unwrap().value(),
        MetricValue::Gauge(4.5)
    );
}

#[tokio::test]
async fn undecryptable_batch_is_server_error() {
    let ctx = build_secured_context(Security {
        decryptor: Some(decryptor()),
        ..Security::default()
    });
    let plain = Sealer::default().seal(&batch()).unwrap();
    let res = post_batch(&ctx.app, plain.body, &[("Content-Encoding", "gzip")]).await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(ctx.storage.get_all().await.unwrap().is_empty());
}
