//! The canonical contact and event schema.
//!
//! Callers send data in this one shape for every CRM; provider-specific
//! field names and structures are applied downstream by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// The names of all standard contact fields, in canonical order.
pub const STANDARD_FIELDS: [&str; 16] = [
    "email",
    "first_name",
    "last_name",
    "phone",
    "company",
    "job_title",
    "department",
    "street_address",
    "street_address_2",
    "city",
    "state",
    "postal_code",
    "country",
    "website",
    "timezone",
    "language",
];

/// A contact in the canonical schema.
///
/// `email` is the only required field; everything else is optional.
/// Custom properties carry arbitrary caller data and are placed per the
/// target provider's structure rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardContact {
    /// Contact email address (required).
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Phone number, E.164 recommended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// State, province or region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// Country, ISO 3166-1 alpha-2 recommended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// IANA timezone identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// ISO 639-1 language code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Arbitrary custom properties (lead score, source, tags, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom_properties: Map<String, JsonValue>,
}

impl StandardContact {
    /// Creates a contact with only the email set.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    /// Returns a standard field value by name, `None` when unset.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "email" => Some(&self.email),
            "first_name" => self.first_name.as_deref(),
            "last_name" => self.last_name.as_deref(),
            "phone" => self.phone.as_deref(),
            "company" => self.company.as_deref(),
            "job_title" => self.job_title.as_deref(),
            "department" => self.department.as_deref(),
            "street_address" => self.street_address.as_deref(),
            "street_address_2" => self.street_address_2.as_deref(),
            "city" => self.city.as_deref(),
            "state" => self.state.as_deref(),
            "postal_code" => self.postal_code.as_deref(),
            "country" => self.country.as_deref(),
            "website" => self.website.as_deref(),
            "timezone" => self.timezone.as_deref(),
            "language" => self.language.as_deref(),
            _ => None,
        }
    }

    /// Standard fields that carry a non-empty value, in canonical order.
    #[must_use]
    pub fn present_fields(&self) -> Vec<(&'static str, &str)> {
        STANDARD_FIELDS
            .iter()
            .filter_map(|name| {
                self.field(name)
                    .filter(|value| !value.trim().is_empty())
                    .map(|value| (*name, value))
            })
            .collect()
    }

    /// Returns a normalized copy: email lowercased and trimmed, phone
    /// stripped of separator characters, country uppercased.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut contact = self.clone();
        contact.email = contact.email.trim().to_lowercase();
        if let Some(phone) = contact.phone.take() {
            contact.phone = Some(normalize_phone(&phone));
        }
        if let Some(country) = contact.country.take() {
            contact.country = Some(country.trim().to_uppercase());
        }
        contact
    }
}

fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect()
}

/// An event in the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardEvent {
    /// Event name, e.g. `order_created`.
    pub event_name: String,
    /// Event properties.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, JsonValue>,
    /// Event timestamp; defaults to now at transform time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Monetary value attached to the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl StandardEvent {
    /// Creates an event with only the name set.
    #[must_use]
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            properties: Map::new(),
            timestamp: None,
            value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalized_email_and_country() {
        let mut contact = StandardContact::new("  John.Doe@Example.COM ");
        contact.country = Some("us".to_string());
        let normalized = contact.normalized();
        assert_eq!(normalized.email, "john.doe@example.com");
        assert_eq!(normalized.country.as_deref(), Some("US"));
    }

    #[test]
    fn normalized_phone_strips_separators() {
        let mut contact = StandardContact::new("a@b.co");
        contact.phone = Some("+1 (234) 567-89.00".to_string());
        assert_eq!(
            contact.normalized().phone.as_deref(),
            Some("+12345678900")
        );
    }

    #[test]
    fn present_fields_skips_unset_and_empty() {
        let mut contact = StandardContact::new("a@b.co");
        contact.first_name = Some("Ada".to_string());
        contact.last_name = Some("   ".to_string());
        let fields = contact.present_fields();
        assert_eq!(fields, vec![("email", "a@b.co"), ("first_name", "Ada")]);
    }

    #[test]
    fn contact_serde_roundtrip() {
        let mut contact = StandardContact::new("a@b.co");
        contact.company = Some("Acme".to_string());
        contact
            .custom_properties
            .insert("lead_score".to_string(), json!(85));

        let json = serde_json::to_string(&contact).expect("serialize");
        let parsed: StandardContact = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(contact, parsed);
    }

    #[test]
    fn event_defaults() {
        let event = StandardEvent::new("page_viewed");
        assert!(event.properties.is_empty());
        assert!(event.timestamp.is_none());
        assert!(event.value.is_none());
    }
}
