use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use metrix_common::types::{MetricKind, ModelError, Record, RequestMetric};
use serde::de::DeserializeOwned;

use crate::logging::TraceId;
use crate::metric_service::ServiceError;
use crate::state::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";

/// Plain-text error body, logged at a level matching the status class.
pub fn error_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    if status.is_server_error() {
        tracing::error!(trace_id = %trace_id, status = status.as_u16(), error = %msg, "Request failed");
    } else {
        tracing::warn!(trace_id = %trace_id, status = status.as_u16(), error = %msg, "Request failed");
    }
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], msg.to_string()).into_response()
}

fn service_error(trace_id: &str, e: &ServiceError) -> Response {
    let status = match e {
        ServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::NotSupported(_) | ServiceError::Timeout | ServiceError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, trace_id, &e.to_string())
}

fn decode<T: DeserializeOwned>(trace_id: &str, body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, trace_id, &format!("invalid JSON: {e}"))
    })
}

fn text(body: String) -> Response {
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// `GET /`: one `name\tvalue` line per stored metric, sorted by name.
pub async fn list(State(state): State<AppState>) -> Response {
    let mut records = state.service.get_all().await;
    records.sort_by(|a, b| a.name().cmp(b.name()));
    let body: String = records
        .iter()
        .map(|r| format!("{}\t{}\n", r.name(), r.value()))
        .collect();
    ([(header::CONTENT_TYPE, TEXT_HTML)], body).into_response()
}

/// `POST /update/{kind}/{name}/{value}`
pub async fn update_from_path(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    match state.service.push(&name, &kind, &value).await {
        Ok(stored) => {
            tracing::debug!(trace_id = %trace_id, name = %name, value = %stored.value(), "Metric updated");
            text(String::new())
        }
        Err(e) => service_error(&trace_id, &e),
    }
}

/// `POST /update` with one JSON item; answers with the merged item.
pub async fn update_json(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    body: Bytes,
) -> Response {
    let item: RequestMetric = match decode(&trace_id, &body) {
        Ok(item) => item,
        Err(response) => return response,
    };
    let record = match item.to_record() {
        Ok(record) => record,
        Err(e) => return service_error(&trace_id, &ServiceError::from(e)),
    };
    match state.service.push_record(record).await {
        Ok(stored) => Json(RequestMetric::from(stored)).into_response(),
        Err(e) => service_error(&trace_id, &e),
    }
}

/// `POST /updates` with a JSON array, already opened by the envelope layers.
pub async fn update_batch(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    body: Bytes,
) -> Response {
    let items: Vec<RequestMetric> = match decode(&trace_id, &body) {
        Ok(items) => items,
        Err(response) => return response,
    };
    if items.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "empty batch");
    }
    let records: Result<Vec<Record>, ModelError> = items.iter().map(RequestMetric::to_record).collect();
    let records = match records {
        Ok(records) => records,
        Err(e) => return service_error(&trace_id, &ServiceError::from(e)),
    };

    let count = records.len();
    match state.service.push_batch(records).await {
        Ok(()) => {
            tracing::info!(trace_id = %trace_id, items = count, "Batch merged");
            text(String::new())
        }
        Err(e) => service_error(&trace_id, &e),
    }
}

/// `GET /value/{kind}/{name}`: the formatted value, or 404 for anything
/// that cannot be found, including an unknown kind.
pub async fn value_from_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.service.get(&name, kind).await {
        Ok(record) => text(record.value().to_string()),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `POST /value` with `{"id", "type"}`; answers with the stored item.
pub async fn value_json(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    body: Bytes,
) -> Response {
    let query: RequestMetric = match decode(&trace_id, &body) {
        Ok(query) => query,
        Err(response) => return response,
    };
    match state.service.get(&query.id, query.kind).await {
        Ok(record) => Json(RequestMetric::from(record)).into_response(),
        Err(e) => service_error(&trace_id, &e),
    }
}

/// `GET /ping`: 200 when the backend answers, 500 otherwise.
pub async fn ping(State(state): State<AppState>, Extension(trace_id): Extension<TraceId>) -> Response {
    match state.service.ping().await {
        Ok(()) => text(String::new()),
        Err(e) => service_error(&trace_id, &e),
    }
}
