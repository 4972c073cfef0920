//! Wire envelope for batch updates.
//!
//! Outbound: serialize, sign the serialized bytes, gzip, then optionally
//! RSA-encrypt the compressed stream. Inbound is the exact mirror.

pub mod cipher;
pub mod compress;
pub mod signer;
pub mod subnet;

pub use cipher::{Decryptor, Encryptor};
pub use signer::Signer;
pub use subnet::TrustedSubnet;

use crate::types::RequestMetric;

/// HTTP header carrying the hex HMAC of the decompressed batch.
pub const HASH_HEADER: &str = "HashSHA256";
/// HTTP header carrying the client-declared source address.
pub const REAL_IP_HEADER: &str = "X-Real-IP";
/// gRPC metadata key for the batch HMAC.
pub const HASH_METADATA: &str = "hashsha256";
/// gRPC metadata key for the client-declared source address.
pub const REAL_IP_METADATA: &str = "x-real-ip";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),
    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("inflated body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("batch encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("batch decoding failed: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("signature header missing")]
    MissingSignature,
    #[error("signature mismatch")]
    BadSignature,
    #[error("invalid key: {0}")]
    Key(String),
    #[error("encryption failed: {0}")]
    Encrypt(#[source] rsa::Error),
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("invalid subnet '{cidr}': {reason}")]
    Subnet { cidr: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// Output of [`Sealer::seal`].
#[derive(Debug, Clone)]
pub struct Sealed {
    /// Gzip stream, encrypted when the sealer holds a public key.
    pub body: Vec<u8>,
    /// Hex HMAC of the serialized batch when the sealer holds a key.
    pub hash: Option<String>,
}

/// Agent side of the envelope.
#[derive(Clone, Default)]
pub struct Sealer {
    signer: Option<Signer>,
    encryptor: Option<Encryptor>,
}

impl Sealer {
    pub fn new(signer: Option<Signer>, encryptor: Option<Encryptor>) -> Self {
        Self { signer, encryptor }
    }

    pub fn encrypts(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Signature over the JSON encoding of `batch`, if a key is configured.
    pub fn sign(&self, batch: &[RequestMetric]) -> Result<Option<String>> {
        match &self.signer {
            Some(signer) => {
                let data = serde_json::to_vec(batch).map_err(EnvelopeError::Encode)?;
                Ok(Some(signer.hash_hex(&data)?))
            }
            None => Ok(None),
        }
    }

    pub fn seal(&self, batch: &[RequestMetric]) -> Result<Sealed> {
        let data = serde_json::to_vec(batch).map_err(EnvelopeError::Encode)?;
        let hash = match &self.signer {
            Some(signer) => Some(signer.hash_hex(&data)?),
            None => None,
        };
        let mut body = compress::gzip(&data)?;
        if let Some(encryptor) = &self.encryptor {
            body = encryptor.encrypt(&body)?;
        }
        Ok(Sealed { body, hash })
    }
}

/// Server side of the envelope.
#[derive(Clone, Default)]
pub struct Opener {
    signer: Option<Signer>,
    decryptor: Option<Decryptor>,
}

impl Opener {
    pub fn new(signer: Option<Signer>, decryptor: Option<Decryptor>) -> Self {
        Self { signer, decryptor }
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    pub fn decryptor(&self) -> Option<&Decryptor> {
        self.decryptor.as_ref()
    }

    /// Decrypts (when configured) and decompresses a sealed body.
    pub fn unwrap_body(&self, body: &[u8]) -> Result<Vec<u8>> {
        let compressed = match &self.decryptor {
            Some(decryptor) => decryptor.decrypt(body)?,
            None => body.to_vec(),
        };
        compress::gunzip(&compressed)
    }

    /// Checks `hash` against the decompressed bytes when a key is configured.
    pub fn verify(&self, data: &[u8], hash: Option<&str>) -> Result<()> {
        match &self.signer {
            Some(signer) => signer.verify(data, hash.ok_or(EnvelopeError::MissingSignature)?),
            None => Ok(()),
        }
    }

    /// Full inbound pipeline: decrypt, decompress, verify, deserialize.
    pub fn open(&self, body: &[u8], hash: Option<&str>) -> Result<Vec<RequestMetric>> {
        let data = self.unwrap_body(body)?;
        self.verify(&data, hash)?;
        serde_json::from_slice(&data).map_err(EnvelopeError::Decode)
    }
}
