//! Inbound envelope layers.
//!
//! Batch requests pass through, outermost first: [`decrypt_body`],
//! [`gunzip_body`], [`trusted_subnet`] and [`verify_signature`]. Other
//! routes only get [`gunzip_body`].

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrix_common::envelope::{compress, EnvelopeError, HASH_HEADER, REAL_IP_HEADER};

use crate::logging::TraceId;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn trace_id(parts: &Parts) -> String {
    parts
        .extensions
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default()
}

fn reject(status: StatusCode, trace_id: &str, reason: &str) -> Response {
    tracing::warn!(trace_id = %trace_id, status = status.as_u16(), reason = %reason, "Request rejected");
    (status, reason.to_string()).into_response()
}

async fn read_body(req: Request) -> Result<(Parts, Bytes), Response> {
    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => Ok((parts, bytes)),
        Err(e) => Err(reject(
            StatusCode::BAD_REQUEST,
            &trace_id(&parts),
            &format!("reading body: {e}"),
        )),
    }
}

fn rebuild(mut parts: Parts, body: impl Into<Body>) -> Request {
    parts.headers.remove(header::CONTENT_LENGTH);
    Request::from_parts(parts, body.into())
}

/// Replaces an RSA-encrypted body with the decrypted bytes. Fails with 500.
pub async fn decrypt_body(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(decryptor) = state.opener.decryptor() else {
        return next.run(req).await;
    };
    let (parts, body) = match read_body(req).await {
        Ok(read) => read,
        Err(response) => return response,
    };
    match decryptor.decrypt(&body) {
        Ok(plain) => next.run(rebuild(parts, plain)).await,
        Err(e) => reject(StatusCode::INTERNAL_SERVER_ERROR, &trace_id(&parts), &e.to_string()),
    }
}

/// Inflates bodies sent with `Content-Encoding: gzip`. Fails with 400, or
/// 413 when the inflated body exceeds the body limit.
pub async fn gunzip_body(req: Request, next: Next) -> Response {
    let gzipped = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);
    if !gzipped {
        return next.run(req).await;
    }

    let (mut parts, body) = match read_body(req).await {
        Ok(read) => read,
        Err(response) => return response,
    };
    match compress::gunzip_with_limit(&body, MAX_BODY_BYTES) {
        Ok(plain) => {
            parts.headers.remove(header::CONTENT_ENCODING);
            next.run(rebuild(parts, plain)).await
        }
        Err(e @ EnvelopeError::TooLarge { .. }) => {
            reject(StatusCode::PAYLOAD_TOO_LARGE, &trace_id(&parts), &e.to_string())
        }
        Err(e) => reject(StatusCode::BAD_REQUEST, &trace_id(&parts), &e.to_string()),
    }
}

/// Admits only clients whose `X-Real-IP` lies in the trusted subnet. Fails
/// with 403.
pub async fn trusted_subnet(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(subnet) = state.trusted_subnet.as_deref() else {
        return next.run(req).await;
    };
    let declared = req
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok());
    if subnet.admits(declared) {
        return next.run(req).await;
    }

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();
    tracing::warn!(
        trace_id = %trace_id,
        subnet = %subnet,
        real_ip = declared.unwrap_or("-"),
        "Untrusted source"
    );
    (StatusCode::FORBIDDEN, "untrusted source").into_response()
}

/// Checks the `HashSHA256` header against the decompressed body. Fails with
/// 400.
pub async fn verify_signature(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.signs() {
        return next.run(req).await;
    }
    let (parts, body) = match read_body(req).await {
        Ok(read) => read,
        Err(response) => return response,
    };
    let hash = parts
        .headers
        .get(HASH_HEADER)
        .and_then(|v| v.to_str().ok());
    match state.opener.verify(&body, hash) {
        Ok(()) => next.run(rebuild(parts, body)).await,
        Err(e) => reject(StatusCode::BAD_REQUEST, &trace_id(&parts), &e.to_string()),
    }
}
