//! Error types for the sync crate.

use crm_relay_core::IntegrationId;
use crm_relay_provider::ProviderError;
use crm_relay_transform::TransformError;
use crm_relay_vault::CredentialError;
use std::fmt;

/// Errors from store implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A query or statement failed.
    QueryFailed { reason: String },
    /// Stored data could not be converted to its domain type.
    Corrupted { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryFailed { reason } => write!(f, "store query failed: {reason}"),
            Self::Corrupted { reason } => write!(f, "stored data is corrupted: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from a sync attempt.
///
/// Wraps the lower-level failure and carries the retryability
/// classification the state machine acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Payload transformation failed (always terminal).
    Transform(TransformError),
    /// The provider call failed.
    Provider(ProviderError),
    /// Credential decryption failed (always terminal).
    Credential(CredentialError),
    /// The ledger or integration store failed.
    Store(StoreError),
    /// The integration behind an attempt no longer exists.
    IntegrationNotFound { id: IntegrationId },
    /// The integration behind an attempt has been disconnected.
    IntegrationInactive { id: IntegrationId },
    /// The overall fan-out deadline elapsed.
    RequestTimeout,
}

impl SyncError {
    /// Whether a retry of the same attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(err) => err.is_retryable(),
            Self::RequestTimeout => true,
            Self::Transform(_)
            | Self::Credential(_)
            | Self::Store(_)
            | Self::IntegrationNotFound { .. }
            | Self::IntegrationInactive { .. } => false,
        }
    }

    /// The provider HTTP status code, when the failure carries one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Provider(ProviderError::ApiError { status_code, .. }) => Some(*status_code),
            _ => None,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform(err) => write!(f, "transform failed: {err}"),
            Self::Provider(err) => write!(f, "provider call failed: {err}"),
            Self::Credential(err) => write!(f, "credential error: {err}"),
            Self::Store(err) => write!(f, "store error: {err}"),
            Self::IntegrationNotFound { id } => {
                write!(f, "integration not found: {id}")
            }
            Self::IntegrationInactive { id } => {
                write!(f, "integration is disconnected: {id}")
            }
            Self::RequestTimeout => write!(f, "sync request timed out"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<TransformError> for SyncError {
    fn from(err: TransformError) -> Self {
        Self::Transform(err)
    }
}

impl From<ProviderError> for SyncError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

impl From<CredentialError> for SyncError {
    fn from(err: CredentialError) -> Self {
        Self::Credential(err)
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}
