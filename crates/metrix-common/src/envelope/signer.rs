use super::{EnvelopeError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over serialized batches.
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    /// Returns `None` for an empty key, which disables signing.
    pub fn new(key: &str) -> Option<Self> {
        if key.is_empty() {
            None
        } else {
            Some(Self {
                key: key.as_bytes().to_vec(),
            })
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| EnvelopeError::Key(e.to_string()))
    }

    pub fn hash(&self, data: &[u8]) -> Result<[u8; 32]> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }

    pub fn hash_hex(&self, data: &[u8]) -> Result<String> {
        Ok(hex::encode(self.hash(data)?))
    }

    /// Constant-time comparison of `data`'s MAC against a hex digest.
    pub fn verify(&self, data: &[u8], expected_hex: &str) -> Result<()> {
        let expected = hex::decode(expected_hex.trim()).map_err(|_| EnvelopeError::BadSignature)?;
        let mut mac = self.mac()?;
        mac.update(data);
        mac.verify_slice(&expected)
            .map_err(|_| EnvelopeError::BadSignature)
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_disables_signing() {
        assert!(Signer::new("").is_none());
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        let signer = Signer::new("Jefe").unwrap();
        assert_eq!(
            signer.hash_hex(b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_accepts_own_hash_only() {
        let signer = Signer::new("k").unwrap();
        let hash = signer.hash_hex(b"payload").unwrap();
        assert!(signer.verify(b"payload", &hash).is_ok());
        assert!(signer.verify(b"payload", &hash.to_uppercase()).is_ok());
        assert!(matches!(
            signer.verify(b"tampered", &hash),
            Err(EnvelopeError::BadSignature)
        ));
        assert!(matches!(
            signer.verify(b"payload", "not-hex"),
            Err(EnvelopeError::BadSignature)
        ));
    }
}
