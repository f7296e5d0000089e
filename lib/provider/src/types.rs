//! Provider vocabulary shared across the platform.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing a provider type from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProviderTypeError {
    /// The string that failed to parse.
    pub input: String,
}

impl fmt::Display for ParseProviderTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown provider type: {}", self.input)
    }
}

impl std::error::Error for ParseProviderTypeError {}

/// The CRM providers known to the platform.
///
/// Every variant has field mappings in the transform crate; only a subset
/// has a live wire adapter registered in the default registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Klaviyo,
    Salesforce,
    Creatio,
    Hubspot,
    Mailchimp,
    Activecampaign,
    /// SendinBlue, now branded Brevo.
    Sendinblue,
    Zoho,
    Pipedrive,
    Intercom,
    Customerio,
}

impl ProviderType {
    /// All known provider types.
    pub const ALL: [Self; 11] = [
        Self::Klaviyo,
        Self::Salesforce,
        Self::Creatio,
        Self::Hubspot,
        Self::Mailchimp,
        Self::Activecampaign,
        Self::Sendinblue,
        Self::Zoho,
        Self::Pipedrive,
        Self::Intercom,
        Self::Customerio,
    ];

    /// Returns the canonical string name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Klaviyo => "klaviyo",
            Self::Salesforce => "salesforce",
            Self::Creatio => "creatio",
            Self::Hubspot => "hubspot",
            Self::Mailchimp => "mailchimp",
            Self::Activecampaign => "activecampaign",
            Self::Sendinblue => "sendinblue",
            Self::Zoho => "zoho",
            Self::Pipedrive => "pipedrive",
            Self::Intercom => "intercom",
            Self::Customerio => "customerio",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = ParseProviderTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "klaviyo" => Ok(Self::Klaviyo),
            "salesforce" => Ok(Self::Salesforce),
            "creatio" => Ok(Self::Creatio),
            "hubspot" => Ok(Self::Hubspot),
            "mailchimp" => Ok(Self::Mailchimp),
            "activecampaign" => Ok(Self::Activecampaign),
            "sendinblue" => Ok(Self::Sendinblue),
            "zoho" => Ok(Self::Zoho),
            "pipedrive" => Ok(Self::Pipedrive),
            "intercom" => Ok(Self::Intercom),
            "customerio" => Ok(Self::Customerio),
            other => Err(ParseProviderTypeError {
                input: other.to_string(),
            }),
        }
    }
}

/// Identifies a contact at the provider side.
///
/// At least one of the fields must be set; a provider-native `id` takes
/// precedence over email or phone lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactIdentifier {
    /// Provider-native entity id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Contact email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ContactIdentifier {
    /// Identifier by provider-native id.
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Identifier by email address.
    #[must_use]
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    /// True when no identifying field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

/// The outcome of a successful provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// HTTP status code returned by the provider.
    pub status_code: u16,
    /// Provider-side entity id, when the response carries one.
    pub entity_id: Option<String>,
    /// Response body as returned by the provider.
    pub body: JsonValue,
}

impl ProviderResponse {
    /// Creates a response with no entity id.
    #[must_use]
    pub fn new(status_code: u16, body: JsonValue) -> Self {
        Self {
            status_code,
            entity_id: None,
            body,
        }
    }

    /// Attaches the provider-side entity id.
    #[must_use]
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }
}
