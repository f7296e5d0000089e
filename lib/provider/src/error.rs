//! Error types for provider adapters.

use crate::types::ProviderType;
use std::fmt;

/// Errors from CRM provider operations.
///
/// The retryability classification drives the sync retry state machine:
/// transient transport failures and provider 5xx responses are retryable,
/// everything else is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// A required credential field is missing or empty.
    MissingCredential { field: &'static str },
    /// The provider rejected the credentials.
    AuthenticationFailed { reason: String },
    /// The provider returned an error response.
    ApiError { status_code: u16, body: String },
    /// Connection to the provider failed.
    ConnectionFailed { reason: String },
    /// The request timed out.
    Timeout,
    /// No adapter is registered for this provider.
    UnsupportedProvider { provider: ProviderType },
    /// The provider returned a response we could not interpret.
    InvalidResponse { reason: String },
    /// The request payload cannot be sent to this provider.
    InvalidPayload { reason: String },
}

impl ProviderError {
    /// Whether a retry of the same request could plausibly succeed.
    ///
    /// Server-side errors (5xx), connection failures and timeouts are
    /// retryable. Authentication, client errors (4xx) and local failures
    /// are terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::ConnectionFailed { .. } | Self::Timeout => true,
            Self::MissingCredential { .. }
            | Self::AuthenticationFailed { .. }
            | Self::UnsupportedProvider { .. }
            | Self::InvalidResponse { .. }
            | Self::InvalidPayload { .. } => false,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential { field } => {
                write!(f, "missing credential field: {field}")
            }
            Self::AuthenticationFailed { reason } => {
                write!(f, "authentication failed: {reason}")
            }
            Self::ApiError { status_code, body } => {
                write!(f, "provider API error ({status_code}): {body}")
            }
            Self::ConnectionFailed { reason } => {
                write!(f, "connection failed: {reason}")
            }
            Self::Timeout => write!(f, "provider request timed out"),
            Self::UnsupportedProvider { provider } => {
                write!(f, "no adapter registered for provider: {provider}")
            }
            Self::InvalidResponse { reason } => {
                write!(f, "invalid provider response: {reason}")
            }
            Self::InvalidPayload { reason } => {
                write!(f, "invalid request payload: {reason}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = ProviderError::ApiError {
            status_code: 503,
            body: "service unavailable".to_string(),
        };
        assert!(err.is_retryable());
        assert!(ProviderError::Timeout.is_retryable());
        assert!(
            ProviderError::ConnectionFailed {
                reason: "refused".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn client_errors_are_terminal() {
        let err = ProviderError::ApiError {
            status_code: 422,
            body: "bad payload".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(
            !ProviderError::AuthenticationFailed {
                reason: "invalid key".to_string()
            }
            .is_retryable()
        );
        assert!(!ProviderError::MissingCredential { field: "api_key" }.is_retryable());
        assert!(
            !ProviderError::UnsupportedProvider {
                provider: ProviderType::Hubspot
            }
            .is_retryable()
        );
    }

    #[test]
    fn display_includes_status() {
        let err = ProviderError::ApiError {
            status_code: 500,
            body: "boom".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
    }
}
