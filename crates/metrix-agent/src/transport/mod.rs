//! Outbound transports for metric batches.

pub mod grpc;
pub mod http;

pub use grpc::GrpcTransport;
pub use http::HttpTransport;

use crate::config::{AgentConfig, TransportKind};
use async_trait::async_trait;
use metrix_common::envelope::{EnvelopeError, Encryptor, Sealer, Signer};
use metrix_common::types::RequestMetric;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("grpc call failed: {0}")]
    Grpc(#[from] tonic::Status),
    #[error("invalid server address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("invalid metadata value: {0}")]
    Metadata(String),
    #[error("transport is closed")]
    Closed,
    #[error("sender aborted: {0}")]
    Aborted(String),
}

/// Sends one batch of wire items to the server.
///
/// Implementations are shared by all dispatch workers of a cycle.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_batch(&self, batch: &[RequestMetric]) -> Result<(), TransportError>;

    /// Releases the connection. Later sends fail with [`TransportError::Closed`].
    async fn close(&self) -> Result<(), TransportError>;
}

/// Builds the sealer from the configured HMAC key and public key path.
pub fn sealer_from_config(config: &AgentConfig) -> Result<Sealer, TransportError> {
    let encryptor = if config.crypto_key.is_empty() {
        None
    } else {
        Some(Encryptor::load(&config.crypto_key)?)
    };
    Ok(Sealer::new(Signer::new(&config.key), encryptor))
}

/// Builds the transport selected in `config`.
pub fn from_config(config: &AgentConfig) -> Result<Arc<dyn Transport>, TransportError> {
    let sealer = sealer_from_config(config)?;
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::Http => Arc::new(HttpTransport::new(
            &config.server_address,
            config.request_timeout(),
            sealer,
        )?),
        TransportKind::Grpc => Arc::new(GrpcTransport::new(
            &config.server_address,
            config.request_timeout(),
            sealer,
        )?),
    };
    Ok(transport)
}

/// `host:port` part of an address that may carry a scheme or path.
pub(crate) fn authority(address: &str) -> &str {
    let rest = address
        .split_once("://")
        .map_or(address, |(_, rest)| rest);
    rest.split('/').next().unwrap_or(rest)
}

/// Local address the OS would use to reach `server_address`.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
pub fn outbound_ip(server_address: &str) -> io::Result<IpAddr> {
    let target = authority(server_address)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "address did not resolve"))?;
    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local)?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}

/// Resolves the address sent as `X-Real-IP`, logging when it cannot.
pub(crate) fn declared_ip(server_address: &str) -> Option<IpAddr> {
    match outbound_ip(server_address) {
        Ok(ip) => Some(ip),
        Err(e) => {
            tracing::warn!(server = %server_address, error = %e, "Cannot determine outbound address");
            None
        }
    }
}
