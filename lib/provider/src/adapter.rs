//! The CrmAdapter trait and shared request plumbing.
//!
//! All provider integrations implement [`CrmAdapter`], giving the dispatcher
//! and the integration registry a uniform surface regardless of provider.

use crate::error::ProviderError;
use crate::types::{ContactIdentifier, ProviderResponse, ProviderType};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Trait for CRM provider adapters.
///
/// Credentials arrive as a decrypted JSON document per call; adapters hold no
/// credential state. Payloads are already in provider-native shape (the
/// transform crate produced them) — adapters only add provider API envelopes.
#[async_trait]
pub trait CrmAdapter: Send + Sync {
    /// The provider this adapter talks to.
    fn provider_type(&self) -> ProviderType;

    /// Credential fields this adapter requires.
    fn required_credentials(&self) -> &'static [&'static str];

    /// Validates credentials with a live, read-only provider call.
    ///
    /// Nothing is persisted; the caller decides what to do with the outcome.
    async fn validate_credentials(&self, credentials: &JsonValue) -> Result<bool, ProviderError>;

    /// Creates or updates a contact from a provider-native payload.
    async fn create_or_update_contact(
        &self,
        credentials: &JsonValue,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Records an event against a contact.
    async fn send_event(
        &self,
        credentials: &JsonValue,
        identifier: &ContactIdentifier,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Fetches a contact, returning `None` when not found.
    async fn get_contact(
        &self,
        credentials: &JsonValue,
        identifier: &ContactIdentifier,
    ) -> Result<Option<JsonValue>, ProviderError>;
}

/// Extracts a required non-empty string field from a credential document.
pub(crate) fn required_str<'a>(
    credentials: &'a JsonValue,
    field: &'static str,
) -> Result<&'a str, ProviderError> {
    match credentials.get(field).and_then(JsonValue::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ProviderError::MissingCredential { field }),
    }
}

/// Extracts an optional string field from a credential document.
pub(crate) fn optional_str<'a>(credentials: &'a JsonValue, field: &str) -> Option<&'a str> {
    credentials
        .get(field)
        .and_then(JsonValue::as_str)
        .filter(|value| !value.trim().is_empty())
}

/// Maps a reqwest transport error to the provider error taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::ConnectionFailed {
            reason: err.to_string(),
        }
    }
}

/// Maps an error-status response to the provider error taxonomy.
///
/// 401 and 403 are authentication failures; everything else keeps the raw
/// status and body so retryability can be derived from the status class.
pub(crate) fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        401 => ProviderError::AuthenticationFailed {
            reason: if body.is_empty() {
                "invalid credentials".to_string()
            } else {
                body
            },
        },
        403 => ProviderError::AuthenticationFailed {
            reason: "credentials lack required permissions".to_string(),
        },
        _ => ProviderError::ApiError {
            status_code: status,
            body,
        },
    }
}

/// Reads a response body as JSON, tolerating empty bodies.
///
/// Providers answer some writes with `204 No Content`; an empty body maps to
/// JSON null rather than a parse error.
pub(crate) fn parse_body(text: &str) -> Result<JsonValue, ProviderError> {
    if text.trim().is_empty() {
        return Ok(JsonValue::Null);
    }
    serde_json::from_str(text).map_err(|e| ProviderError::InvalidResponse {
        reason: format!("body is not valid JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_str_present() {
        let creds = json!({"api_key": "pk_123"});
        assert_eq!(required_str(&creds, "api_key").expect("present"), "pk_123");
    }

    #[test]
    fn required_str_missing_or_empty() {
        let creds = json!({"api_key": "   "});
        assert!(matches!(
            required_str(&creds, "api_key"),
            Err(ProviderError::MissingCredential { field: "api_key" })
        ));
        assert!(matches!(
            required_str(&json!({}), "username"),
            Err(ProviderError::MissingCredential { field: "username" })
        ));
    }

    #[test]
    fn status_error_classification() {
        assert!(matches!(
            status_error(401, "bad key".to_string()),
            ProviderError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            status_error(403, String::new()),
            ProviderError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            status_error(500, "oops".to_string()),
            ProviderError::ApiError {
                status_code: 500,
                ..
            }
        ));
    }

    #[test]
    fn parse_body_empty_is_null() {
        assert_eq!(parse_body("").expect("empty ok"), JsonValue::Null);
        assert_eq!(
            parse_body("{\"a\":1}").expect("json ok"),
            json!({"a": 1})
        );
        assert!(parse_body("not json").is_err());
    }
}
