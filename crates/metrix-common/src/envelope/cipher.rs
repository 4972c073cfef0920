//! Chunked RSA-OAEP(SHA-256).
//!
//! A block carries at most `k - 2*32 - 2` plaintext bytes where `k` is the
//! modulus size in bytes; every block encrypts to exactly `k` bytes and
//! blocks are concatenated in order.

use super::{EnvelopeError, Result};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;

const HASH_LEN: usize = 32;
const OAEP_OVERHEAD: usize = 2 * HASH_LEN + 2;

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| EnvelopeError::Key(format!("{}: {e}", path.display())))
}

#[derive(Clone)]
pub struct Encryptor {
    key: RsaPublicKey,
}

impl Encryptor {
    /// Fails when the modulus leaves no room for OAEP(SHA-256) plaintext.
    pub fn new(key: RsaPublicKey) -> Result<Self> {
        if key.size() <= OAEP_OVERHEAD {
            return Err(EnvelopeError::Key(format!(
                "{}-bit modulus is too small for OAEP(SHA-256)",
                key.size() * 8
            )));
        }
        Ok(Self { key })
    }

    /// Parses an SPKI ("PUBLIC KEY") PEM document.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| EnvelopeError::Key(e.to_string()))?;
        Self::new(key)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    pub fn chunk_size(&self) -> usize {
        self.key.size().saturating_sub(OAEP_OVERHEAD)
    }

    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let mut rng = rand::thread_rng();
        let chunk = self.chunk_size();
        if chunk == 0 {
            return Err(EnvelopeError::Key("modulus too small".into()));
        }
        let blocks = plain.len().div_ceil(chunk);
        let mut out = Vec::with_capacity(blocks * self.key.size());
        for part in plain.chunks(chunk) {
            let block = self
                .key
                .encrypt(&mut rng, Oaep::new::<Sha256>(), part)
                .map_err(EnvelopeError::Encrypt)?;
            out.extend_from_slice(&block);
        }
        Ok(out)
    }
}

#[derive(Clone)]
pub struct Decryptor {
    key: RsaPrivateKey,
}

impl Decryptor {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Parses a PKCS#8 ("PRIVATE KEY") PEM document.
    pub fn from_pem(pem: &str) -> Result<Self> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(Self::new)
            .map_err(|e| EnvelopeError::Key(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        let block = self.key.size();
        if sealed.len() % block != 0 {
            return Err(EnvelopeError::Decrypt(format!(
                "ciphertext length {} is not a multiple of {block}",
                sealed.len()
            )));
        }
        let mut out = Vec::with_capacity(sealed.len());
        for part in sealed.chunks(block) {
            let plain = self
                .key
                .decrypt(Oaep::new::<Sha256>(), part)
                .map_err(|e| EnvelopeError::Decrypt(e.to_string()))?;
            out.extend_from_slice(&plain);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    fn keypair() -> (Encryptor, Decryptor) {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public = RsaPublicKey::from(&private);
        (Encryptor::new(public).unwrap(), Decryptor::new(private))
    }

    #[test]
    fn chunk_size_matches_modulus() {
        let (enc, _) = keypair();
        assert_eq!(enc.chunk_size(), 128 - 66);
    }

    #[test]
    fn rejects_keys_without_room_for_plaintext() {
        let mut rng = rand::thread_rng();
        for bits in [512, 528] {
            let private = RsaPrivateKey::new(&mut rng, bits).unwrap();
            let public = RsaPublicKey::from(&private);
            let pem = public.to_public_key_pem(LineEnding::LF).unwrap();
            assert!(matches!(
                Encryptor::new(public),
                Err(EnvelopeError::Key(_))
            ));
            assert!(matches!(Encryptor::from_pem(&pem), Err(EnvelopeError::Key(_))));
        }

        let private = RsaPrivateKey::new(&mut rng, 544).unwrap();
        let enc = Encryptor::new(RsaPublicKey::from(&private)).unwrap();
        assert_eq!(enc.chunk_size(), 2);
        let sealed = enc.encrypt(b"hello").unwrap();
        assert_eq!(Decryptor::new(private).decrypt(&sealed).unwrap(), b"hello");
    }

    #[test]
    fn multi_block_round_trip() {
        let (enc, dec) = keypair();
        let plain: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
        let sealed = enc.encrypt(&plain).unwrap();
        assert_eq!(sealed.len(), plain.len().div_ceil(enc.chunk_size()) * 128);
        assert_eq!(dec.decrypt(&sealed).unwrap(), plain);
    }

    #[test]
    fn rejects_truncated_ciphertext() {
        let (enc, dec) = keypair();
        let mut sealed = enc.encrypt(b"hello").unwrap();
        sealed.pop();
        assert!(matches!(dec.decrypt(&sealed), Err(EnvelopeError::Decrypt(_))));
    }

    #[test]
    fn wrong_key_fails() {
        let (enc, _) = keypair();
        let (_, other) = keypair();
        let sealed = enc.encrypt(b"hello").unwrap();
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn loads_pem_files() {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public = RsaPublicKey::from(&private);

        let dir = tempfile::tempdir().unwrap();
        let priv_path = dir.path().join("private.pem");
        let pub_path = dir.path().join("public.pem");
        std::fs::write(&priv_path, private.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
        std::fs::write(&pub_path, public.to_public_key_pem(LineEnding::LF).unwrap()).unwrap();

        let enc = Encryptor::load(&pub_path).unwrap();
        let dec = Decryptor::load(&priv_path).unwrap();
        assert_eq!(dec.decrypt(&enc.encrypt(b"payload").unwrap()).unwrap(), b"payload");

        assert!(Encryptor::load(dir.path().join("missing.pem")).is_err());
        assert!(Decryptor::from_pem("garbage").is_err());
    }
}
