//! Error types for the vault crate.

use std::fmt;

/// Errors from credential encryption and decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The supplied key material is unusable.
    InvalidKey { reason: String },
    /// Encryption failed.
    EncryptionFailed { reason: String },
    /// Decryption failed (wrong key, truncated or corrupted ciphertext).
    DecryptionFailed { reason: String },
    /// Decrypted data is not the expected credential format.
    InvalidFormat { reason: String },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey { reason } => {
                write!(f, "invalid encryption key: {reason}")
            }
            Self::EncryptionFailed { reason } => {
                write!(f, "encryption failed: {reason}")
            }
            Self::DecryptionFailed { reason } => {
                write!(f, "decryption failed: {reason}")
            }
            Self::InvalidFormat { reason } => {
                write!(f, "invalid credential format: {reason}")
            }
        }
    }
}

impl std::error::Error for CredentialError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_error_display() {
        let err = CredentialError::DecryptionFailed {
            reason: "ciphertext too short".to_string(),
        };
        assert!(err.to_string().contains("decryption failed"));
        assert!(err.to_string().contains("ciphertext too short"));
    }

    #[test]
    fn invalid_key_display() {
        let err = CredentialError::InvalidKey {
            reason: "key must be 32 bytes".to_string(),
        };
        assert!(err.to_string().contains("invalid encryption key"));
    }
}
