//! AES-256-GCM credential encryption.
//!
//! Ciphertext layout is `nonce (12 bytes) || ciphertext + tag`. A fresh
//! random nonce is generated for every encryption, so encrypting the same
//! credentials twice yields different ciphertexts.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;

use crate::error::CredentialError;

/// AES-256-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// A 256-bit key for credential encryption.
///
/// The key bytes are never printed; `Debug` output is redacted.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parses a key from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CredentialError> {
        let bytes = hex::decode(s).map_err(|e| CredentialError::InvalidKey {
            reason: format!("invalid hex: {e}"),
        })?;
        Self::try_from_slice(&bytes)
    }

    /// Parses a key from standard base64.
    pub fn from_base64(s: &str) -> Result<Self, CredentialError> {
        let bytes = BASE64.decode(s).map_err(|e| CredentialError::InvalidKey {
            reason: format!("invalid base64: {e}"),
        })?;
        Self::try_from_slice(&bytes)
    }

    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn try_from_slice(bytes: &[u8]) -> Result<Self, CredentialError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CredentialError::InvalidKey {
            reason: format!("key must be 32 bytes, got {}", bytes.len()),
        })?;
        Ok(Self(arr))
    }

    fn as_cipher_key(&self) -> &Key<Aes256Gcm> {
        Key::<Aes256Gcm>::from_slice(&self.0)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Encrypts a credential document with the given key.
///
/// The document is serialized to JSON before encryption. Returns the
/// combined `nonce || ciphertext` blob suitable for storage.
pub fn encrypt_credentials(
    key: &EncryptionKey,
    credentials: &serde_json::Value,
) -> Result<Vec<u8>, CredentialError> {
    let plaintext =
        serde_json::to_vec(credentials).map_err(|e| CredentialError::EncryptionFailed {
            reason: format!("serialization failed: {e}"),
        })?;

    let cipher = Aes256Gcm::new(key.as_cipher_key());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext =
        cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| CredentialError::EncryptionFailed {
                reason: "aead encryption failed".to_string(),
            })?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypts a stored credential blob back into its JSON document.
///
/// Fails if the blob is truncated, tampered with, or was encrypted under
/// a different key. GCM authentication means tampering is always detected.
pub fn decrypt_credentials(
    key: &EncryptionKey,
    blob: &[u8],
) -> Result<serde_json::Value, CredentialError> {
    if blob.len() <= NONCE_LEN {
        return Err(CredentialError::DecryptionFailed {
            reason: format!("ciphertext too short: {} bytes", blob.len()),
        });
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(key.as_cipher_key());
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext =
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CredentialError::DecryptionFailed {
                reason: "authentication failed".to_string(),
            })?;

    serde_json::from_slice(&plaintext).map_err(|e| CredentialError::InvalidFormat {
        reason: format!("decrypted data is not valid JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let creds = json!({"api_key": "pk_test_abc123"});

        let blob = encrypt_credentials(&key, &creds).expect("encrypt");
        let decrypted = decrypt_credentials(&key, &blob).expect("decrypt");

        assert_eq!(decrypted, creds);
    }

    #[test]
    fn encryption_is_nondeterministic() {
        let key = EncryptionKey::generate();
        let creds = json!({"api_key": "pk_test_abc123"});

        let blob1 = encrypt_credentials(&key, &creds).expect("encrypt");
        let blob2 = encrypt_credentials(&key, &creds).expect("encrypt");

        assert_ne!(blob1, blob2);
    }

    #[test]
    fn wrong_key_fails() {
        let key = EncryptionKey::generate();
        let other = EncryptionKey::generate();
        let creds = json!({"username": "svc", "password": "hunter2"});

        let blob = encrypt_credentials(&key, &creds).expect("encrypt");
        let result = decrypt_credentials(&other, &blob);

        assert!(matches!(
            result,
            Err(CredentialError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = EncryptionKey::generate();
        let creds = json!({"api_key": "secret"});

        let mut blob = encrypt_credentials(&key, &creds).expect("encrypt");
        let last = blob.len() - 1;
        blob[last] ^= 0xff;

        let result = decrypt_credentials(&key, &blob);
        assert!(matches!(
            result,
            Err(CredentialError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn short_blob_fails() {
        let key = EncryptionKey::generate();
        let result = decrypt_credentials(&key, &[0u8; 8]);
        assert!(matches!(
            result,
            Err(CredentialError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn key_from_hex() {
        let hex_key = "00".repeat(32);
        let key = EncryptionKey::from_hex(&hex_key).expect("parse");
        let creds = json!({"k": "v"});
        let blob = encrypt_credentials(&key, &creds).expect("encrypt");
        assert_eq!(decrypt_credentials(&key, &blob).expect("decrypt"), creds);
    }

    #[test]
    fn key_from_hex_wrong_length() {
        let result = EncryptionKey::from_hex("deadbeef");
        assert!(matches!(result, Err(CredentialError::InvalidKey { .. })));
    }

    #[test]
    fn key_from_base64() {
        let encoded = BASE64.encode([7u8; 32]);
        let key = EncryptionKey::from_base64(&encoded).expect("parse");
        let creds = json!({"token": "t"});
        let blob = encrypt_credentials(&key, &creds).expect("encrypt");
        assert_eq!(decrypt_credentials(&key, &blob).expect("decrypt"), creds);
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = EncryptionKey::from_bytes([0x41; 32]);
        let debug = format!("{key:?}");
        assert_eq!(debug, "EncryptionKey([REDACTED])");
        assert!(!debug.contains('A'.to_string().repeat(4).as_str()));
    }
}
