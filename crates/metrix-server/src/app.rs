use crate::state::AppState;
use crate::{api, logging, middleware as envelope};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;

/// Batch updates: the only routes behind decryption, the trusted subnet and
/// signature checks.
fn batch_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/updates", post(api::update_batch))
        .route("/updates/", post(api::update_batch))
        .layer(middleware::from_fn_with_state(state.clone(), envelope::verify_signature))
        .layer(middleware::from_fn_with_state(state.clone(), envelope::trusted_subnet))
        .layer(middleware::from_fn(envelope::gunzip_body))
        .layer(middleware::from_fn_with_state(state, envelope::decrypt_body))
}

fn metric_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api::list))
        .route("/update", post(api::update_json))
        .route("/update/", post(api::update_json))
        .route("/update/{kind}/{name}/{value}", post(api::update_from_path))
        .route("/value", post(api::value_json))
        .route("/value/", post(api::value_json))
        .route("/value/{kind}/{name}", get(api::value_from_path))
        .route("/ping", get(api::ping))
        .route("/ping/", get(api::ping))
        .layer(middleware::from_fn(envelope::gunzip_body))
}

pub fn build_http_app(state: AppState) -> Router {
    metric_routes()
        .merge(batch_routes(state.clone()))
        .with_state(state)
        .layer(middleware::from_fn(logging::request_logging))
        .layer(CompressionLayer::new())
}
