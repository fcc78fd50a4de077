//! AES-256-GCM encryption for stored OAuth tokens.
//!
//! The configured secret is normalized to a 32-byte key: used as-is when it is
//! already 32 bytes long, otherwise replaced by its SHA-256 digest. Every token
//! is encrypted with a fresh random nonce and serialized as
//! `base64url(nonce || ciphertext || tag)`, so a ciphertext string is
//! self-contained and decryptable by any process sharing the same secret.

use crate::error::CipherError;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use sha2::{Digest, Sha256};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag
const TAG_SIZE: usize = 16;

/// Normalizes a configured secret to exactly 32 key bytes.
pub fn derive_key(secret: &str) -> Result<[u8; KEY_SIZE], CipherError> {
    if secret.is_empty() {
        return Err(CipherError::Configuration(
            "encryption secret is not configured".to_string(),
        ));
    }

    let bytes = secret.as_bytes();
    let mut key = [0u8; KEY_SIZE];
    if bytes.len() == KEY_SIZE {
        key.copy_from_slice(bytes);
    } else {
        key.copy_from_slice(&Sha256::digest(bytes));
    }
    Ok(key)
}

/// Symmetric cipher for credential tokens.
///
/// Cheap to clone; the derived key is computed once at construction and
/// shared read-only afterwards.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Builds a cipher from the configured secret.
    ///
    /// Fails with [`CipherError::Configuration`] when the secret is empty, so a
    /// misconfigured process stops at startup rather than at first use.
    pub fn new(secret: &str) -> Result<Self, CipherError> {
        let key = derive_key(secret)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CipherError::Configuration(format!("failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Encrypts a UTF-8 string with a random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        // Generate random nonce (never reuse!)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(sealed))
    }

    /// Decrypts a value produced by [`encrypt`](Self::encrypt).
    ///
    /// Any tampering, truncation or key mismatch yields
    /// [`CipherError::Decryption`]; garbage is never returned.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let sealed = BASE64
            .decode(ciphertext)
            .map_err(|e| CipherError::Decryption(format!("invalid encoding: {}", e)))?;

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CipherError::Decryption(format!(
                "ciphertext too short: {} bytes",
                sealed.len()
            )));
        }

        let (nonce, body) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| {
                CipherError::Decryption("authentication failed (wrong key or corrupted data)".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| CipherError::Decryption("plaintext is not valid UTF-8".to_string()))
    }
}
