use super::{authority, declared_ip, Transport, TransportError};
use async_trait::async_trait;
use metrix_common::envelope::{Sealer, HASH_METADATA, REAL_IP_METADATA};
use metrix_common::proto::metrics_client::MetricsClient;
use metrix_common::proto::{Metric, UpdateBatchRequest};
use metrix_common::types::RequestMetric;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tonic::codec::CompressionEncoding;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};

/// Calls `UpdateBatch` on the server's gRPC endpoint.
///
/// Without a public key the batch travels as `data` with gzip message
/// compression; with one it travels as the sealed envelope in `sealed`.
pub struct GrpcTransport {
    client: Mutex<Option<MetricsClient<Channel>>>,
    sealer: Sealer,
    real_ip: Option<IpAddr>,
}

impl GrpcTransport {
    /// The channel connects lazily on the first call.
    pub fn new(server_address: &str, timeout: Duration, sealer: Sealer) -> Result<Self, TransportError> {
        let uri = if server_address.contains("://") {
            server_address.to_string()
        } else {
            format!("http://{}", authority(server_address))
        };
        let endpoint = Endpoint::from_shared(uri).map_err(|e| TransportError::Address {
            address: server_address.to_string(),
            reason: e.to_string(),
        })?;
        let channel = endpoint
            .timeout(timeout)
            .connect_timeout(timeout)
            .connect_lazy();
        let client = MetricsClient::new(channel)
            .send_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Gzip);
        Ok(Self {
            client: Mutex::new(Some(client)),
            sealer,
            real_ip: declared_ip(server_address),
        })
    }

    fn client(&self) -> Result<MetricsClient<Channel>, TransportError> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TransportError::Closed)
    }

    fn request(&self, batch: &[RequestMetric]) -> Result<tonic::Request<UpdateBatchRequest>, TransportError> {
        let (message, hash) = if self.sealer.encrypts() {
            let sealed = self.sealer.seal(batch)?;
            let message = UpdateBatchRequest {
                data: Vec::new(),
                sealed: sealed.body,
            };
            (message, sealed.hash)
        } else {
            let message = UpdateBatchRequest {
                data: batch.iter().map(Metric::from).collect(),
                sealed: Vec::new(),
            };
            (message, self.sealer.sign(batch)?)
        };

        let mut request = tonic::Request::new(message);
        if let Some(hash) = hash {
            let value = MetadataValue::try_from(hash.as_str())
                .map_err(|e| TransportError::Metadata(e.to_string()))?;
            request.metadata_mut().insert(HASH_METADATA, value);
        }
        if let Some(ip) = self.real_ip {
            let value = MetadataValue::try_from(ip.to_string().as_str())
                .map_err(|e| TransportError::Metadata(e.to_string()))?;
            request.metadata_mut().insert(REAL_IP_METADATA, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    fn name(&self) -> &'static str {
        "grpc"
    }

    async fn send_batch(&self, batch: &[RequestMetric]) -> Result<(), TransportError> {
        let mut client = self.client()?;
        let request = self.request(batch)?;
        client.update_batch(request).await?;
        tracing::debug!(items = batch.len(), "Batch delivered over grpc");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}
