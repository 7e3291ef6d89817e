//! Symmetric encryption service.
//!
//! `AesGcmEncrypter` uses AES-256-GCM with a random 12-byte nonce prepended
//! to the ciphertext. Output is unpadded URL-safe base64 so it can travel in
//! headers and JSON without escaping.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// AES-256 key size (32 bytes).
const KEY_SIZE: usize = 32;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

/// Encryption errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key init failed: {0}")]
    Key(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    #[error("Decryption failed")]
    Decrypt,
}

/// Symmetric encryption with a server-held key.
pub trait Encrypter: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError>;

    /// Reverse of `encrypt`. Fails on any tampering.
    fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError>;
}

/// Derive a 32-byte key from a passphrase using SHA-256.
fn derive_key(passphrase: &str) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    let result = hasher.finalize();
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&result);
    key
}

/// AES-256-GCM encrypter keyed from the application key.
#[derive(Clone)]
pub struct AesGcmEncrypter {
    cipher: Aes256Gcm,
}

impl AesGcmEncrypter {
    pub fn new(app_key: &str) -> Result<Self, CryptoError> {
        if app_key.is_empty() {
            return Err(CryptoError::Key("application key is empty".into()));
        }
        let key_bytes = derive_key(app_key);
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| CryptoError::Key(e.to_string()))?;
        Ok(Self { cipher })
    }
}

impl Encrypter for AesGcmEncrypter {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(&combined))
    }

    fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let combined = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CryptoError::Malformed(format!("base64: {e}")))?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Malformed("ciphertext too short".into()));
        }

        let nonce = Nonce::from_slice(&combined[..NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &combined[NONCE_SIZE..])
            .map_err(|_| CryptoError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let enc = AesGcmEncrypter::new("test-app-key").unwrap();
        let sealed = enc.encrypt(b"{\"i\":1}").unwrap();
        assert_eq!(enc.decrypt(&sealed).unwrap(), b"{\"i\":1}");
    }

    #[test]
    fn output_is_url_safe() {
        let enc = AesGcmEncrypter::new("test-app-key").unwrap();
        let sealed = enc.encrypt(&[0xff; 64]).unwrap();
        assert!(
            sealed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn nonce_makes_ciphertexts_differ() {
        let enc = AesGcmEncrypter::new("test-app-key").unwrap();
        assert_ne!(enc.encrypt(b"same").unwrap(), enc.encrypt(b"same").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = AesGcmEncrypter::new("correct").unwrap().encrypt(b"x").unwrap();
        let err = AesGcmEncrypter::new("wrong").unwrap().decrypt(&sealed);
        assert!(matches!(err, Err(CryptoError::Decrypt)));
    }

    #[test]
    fn short_or_garbage_input_is_malformed() {
        let enc = AesGcmEncrypter::new("k").unwrap();
        assert!(matches!(enc.decrypt("abc"), Err(CryptoError::Malformed(_))));
        assert!(matches!(enc.decrypt("!!!"), Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(AesGcmEncrypter::new("").is_err());
    }
}
