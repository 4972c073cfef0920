use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::fmt::Write;
use std::time::Instant;

/// Response header echoing the request's trace id.
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Trace id stored in request extensions.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 16 hex chars from 8 random bytes.
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let mut s = String::with_capacity(16);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

const MAX_BODY_LOG_CHARS: usize = 200;

/// Truncates to at most `max` bytes on a char boundary.
fn truncate_body(bytes: &[u8], max: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() > max => {
            let mut end = max;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &s[..end])
        }
        Ok(s) => s.to_string(),
        Err(_) => "<binary body>".to_string(),
    }
}

fn format_elapsed(elapsed_us: u128) -> String {
    if elapsed_us < 1000 {
        format!("{elapsed_us}µs")
    } else if elapsed_us < 1_000_000 {
        format!("{}ms", elapsed_us / 1000)
    } else {
        format!("{:.1}s", elapsed_us as f64 / 1_000_000.0)
    }
}

/// Logs every request and its response, tagged with a fresh trace id.
///
/// Request bodies are not read here: batch bodies are usually compressed
/// or encrypted and are consumed by the envelope layers further in. Only
/// the response body is logged, and only when it is JSON.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let encoding = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    tracing::info!(
        trace_id = %trace_id,
        method = %method,
        path = %path,
        encoding = %encoding,
        ua = %user_agent,
        "--> request"
    );

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status();

    let (parts, body) = response.into_parts();
    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let body_snippet = if is_json && !body_bytes.is_empty() {
        truncate_body(&body_bytes, MAX_BODY_LOG_CHARS)
    } else {
        String::new()
    };

    let status_code = status.as_u16();
    let size = body_bytes.len();
    if status.is_server_error() {
        tracing::error!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, size, body = %body_snippet, "<-- response");
    } else if status.is_client_error() {
        tracing::warn!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, size, body = %body_snippet, "<-- response");
    } else {
        tracing::info!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, size, "<-- response");
    }

    let mut response = Response::from_parts(parts, Body::from(body_bytes));
    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, val);
    }
    response
}
