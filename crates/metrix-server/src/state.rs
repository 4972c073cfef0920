use crate::config::ServerConfig;
use crate::metric_service::MetricService;
use anyhow::Context;
use metrix_common::envelope::{Decryptor, Opener, Signer, TrustedSubnet};
use metrix_storage::Storage;
use std::sync::Arc;

/// Shared by every HTTP handler, middleware and the gRPC service.
#[derive(Clone)]
pub struct AppState {
    pub service: MetricService,
    pub opener: Arc<Opener>,
    pub trusted_subnet: Option<Arc<TrustedSubnet>>,
}

impl AppState {
    pub fn new(service: MetricService, opener: Opener, trusted_subnet: Option<TrustedSubnet>) -> Self {
        Self {
            service,
            opener: Arc::new(opener),
            trusted_subnet: trusted_subnet.map(Arc::new),
        }
    }

    /// Wires the envelope settings of `config` around `storage`.
    pub fn from_config(config: &ServerConfig, storage: Arc<dyn Storage>) -> anyhow::Result<Self> {
        let signer = Signer::new(&config.key);
        let decryptor = if config.crypto_key.is_empty() {
            None
        } else {
            Some(
                Decryptor::load(&config.crypto_key)
                    .with_context(|| format!("loading private key {}", config.crypto_key))?,
            )
        };
        let trusted_subnet = if config.trusted_subnet.is_empty() {
            None
        } else {
            Some(TrustedSubnet::parse(&config.trusted_subnet)?)
        };

        tracing::info!(
            signed = signer.is_some(),
            encrypted = decryptor.is_some(),
            trusted_subnet = %config.trusted_subnet,
            "Envelope configured"
        );

        Ok(Self::new(
            MetricService::new(storage),
            Opener::new(signer, decryptor),
            trusted_subnet,
        ))
    }

    pub fn signs(&self) -> bool {
        self.opener.signer().is_some()
    }

    pub fn decrypts(&self) -> bool {
        self.opener.decryptor().is_some()
    }
}
