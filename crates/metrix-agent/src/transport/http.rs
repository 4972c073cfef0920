use super::{authority, declared_ip, Transport, TransportError};
use async_trait::async_trait;
use metrix_common::envelope::{Sealer, HASH_HEADER, REAL_IP_HEADER};
use metrix_common::types::RequestMetric;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Posts sealed batches to `/updates`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    sealer: Sealer,
    real_ip: Option<IpAddr>,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(server_address: &str, timeout: Duration, sealer: Sealer) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base = if server_address.contains("://") {
            server_address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", authority(server_address))
        };
        Ok(Self {
            client,
            url: format!("{base}/updates"),
            sealer,
            real_ip: declared_ip(server_address),
            closed: AtomicBool::new(false),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send_batch(&self, batch: &[RequestMetric]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let sealed = self.sealer.seal(batch)?;

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(sealed.body);
        if let Some(hash) = sealed.hash {
            request = request.header(HASH_HEADER, hash);
        }
        if let Some(ip) = self.real_ip {
            request = request.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransportError::Status(status.as_u16()));
        }
        tracing::debug!(items = batch.len(), "Batch delivered over http");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
