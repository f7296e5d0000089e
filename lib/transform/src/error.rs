//! Error types for the transform crate.

use crm_relay_provider::ProviderType;
use std::fmt;

/// Errors from contact/event transformation.
///
/// All transform failures are local validation failures and therefore
/// terminal for the sync attempt that carries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// A field the target provider requires is missing or empty.
    MissingField { field: &'static str },
    /// A standard field has no mapping for the target provider.
    ///
    /// Only raised under [`FieldPolicy::Strict`](crate::FieldPolicy).
    UnmappedField {
        field: &'static str,
        provider: ProviderType,
    },
    /// A field value fails validation.
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => {
                write!(f, "required field is missing or empty: {field}")
            }
            Self::UnmappedField { field, provider } => {
                write!(f, "field '{field}' has no mapping for provider {provider}")
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "invalid value for field '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for TransformError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_display() {
        let err = TransformError::MissingField { field: "email" };
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn unmapped_field_display() {
        let err = TransformError::UnmappedField {
            field: "website",
            provider: ProviderType::Mailchimp,
        };
        assert!(err.to_string().contains("website"));
        assert!(err.to_string().contains("mailchimp"));
    }
}
