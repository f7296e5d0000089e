//! Credential vault for secure credential storage.
//!
//! All integration credentials are encrypted at rest with AES-256-GCM.
//! The encryption key is supplied by the caller on every operation; nothing
//! in this crate caches key material. No plaintext credentials are stored
//! in configuration or logs.

pub mod cipher;
pub mod error;

pub use cipher::{EncryptionKey, decrypt_credentials, encrypt_credentials};
pub use error::CredentialError;
