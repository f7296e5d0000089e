//! The transformation engine.
//!
//! Turns canonical contacts and events into provider-native payloads:
//! validate, normalize, map field names, then apply the provider's
//! structural shape. The returned payload is final; nothing downstream
//! mutates it before it reaches the provider adapter.

use crate::contact::{StandardContact, StandardEvent};
use crate::error::TransformError;
use crate::mappings::{CustomFieldPlacement, Structure, mapped_field, required_fields, structure};
use chrono::Utc;
use crm_relay_provider::{ContactIdentifier, ProviderType};
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, warn};

/// How the engine treats standard fields with no mapping for the target
/// provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Drop unmapped fields with a warning.
    #[default]
    Lenient,
    /// Reject the contact when any present field is unmapped.
    Strict,
}

/// Transforms a canonical contact into the provider-native payload.
///
/// # Errors
///
/// Returns [`TransformError::MissingField`] when a provider-required field
/// is absent or empty, [`TransformError::InvalidValue`] for a malformed
/// email, and [`TransformError::UnmappedField`] under
/// [`FieldPolicy::Strict`] when a present field has no mapping.
pub fn transform_contact(
    contact: &StandardContact,
    provider: ProviderType,
    policy: FieldPolicy,
) -> Result<JsonValue, TransformError> {
    validate_contact(contact, provider)?;
    let contact = contact.normalized();

    let mut mapped = Map::new();
    for (standard_field, value) in contact.present_fields() {
        match mapped_field(provider, standard_field) {
            Some(provider_field) => {
                mapped.insert(provider_field.to_string(), json!(value));
            }
            None => match policy {
                FieldPolicy::Lenient => {
                    warn!(
                        field = standard_field,
                        provider = %provider,
                        "standard field has no mapping for provider, dropping"
                    );
                }
                FieldPolicy::Strict => {
                    return Err(TransformError::UnmappedField {
                        field: standard_field,
                        provider,
                    });
                }
            },
        }
    }

    let payload = apply_structure(mapped, &contact.custom_properties, provider);
    debug!(provider = %provider, "contact transformed");
    Ok(payload)
}

fn validate_contact(
    contact: &StandardContact,
    provider: ProviderType,
) -> Result<(), TransformError> {
    for field in required_fields(provider) {
        let present = contact
            .field(field)
            .is_some_and(|value| !value.trim().is_empty());
        if !present {
            return Err(TransformError::MissingField { field });
        }
    }
    if !contact.email.contains('@') {
        return Err(TransformError::InvalidValue {
            field: "email",
            reason: "not a valid email address".to_string(),
        });
    }
    Ok(())
}

fn apply_structure(
    mapped: Map<String, JsonValue>,
    custom: &Map<String, JsonValue>,
    provider: ProviderType,
) -> JsonValue {
    match structure(provider) {
        Structure::AttributesProperties => {
            let mut payload = Map::new();
            payload.insert("attributes".to_string(), JsonValue::Object(mapped));
            if !custom.is_empty() {
                payload.insert("properties".to_string(), JsonValue::Object(custom.clone()));
            }
            JsonValue::Object(payload)
        }
        Structure::ValueProperties => {
            let mut properties = Map::new();
            for (field, value) in mapped {
                properties.insert(field, json!({ "value": value }));
            }
            for (field, value) in custom {
                properties.insert(field.clone(), json!({ "value": value }));
            }
            json!({ "properties": properties })
        }
        Structure::MergeFields => {
            let mut mapped = mapped;
            let email = mapped
                .remove("email_address")
                .unwrap_or_else(|| json!(""));

            let mut merge_fields = Map::new();
            let mut address = Map::new();
            for (field, value) in mapped {
                match field.strip_prefix("ADDRESS.") {
                    Some(part) => {
                        address.insert(part.to_string(), value);
                    }
                    None => {
                        merge_fields.insert(field, value);
                    }
                }
            }
            if !address.is_empty() {
                merge_fields.insert("ADDRESS".to_string(), JsonValue::Object(address));
            }
            for (field, value) in custom {
                merge_fields.insert(field.clone(), value.clone());
            }

            json!({ "email_address": email, "merge_fields": merge_fields })
        }
        Structure::Flat(placement) => {
            let mut payload = mapped;
            if custom.is_empty() {
                return JsonValue::Object(payload);
            }
            match placement {
                CustomFieldPlacement::Root => {
                    for (field, value) in custom {
                        payload.insert(field.clone(), value.clone());
                    }
                }
                CustomFieldPlacement::Suffixed(suffix) => {
                    for (field, value) in custom {
                        payload.insert(format!("{field}{suffix}"), value.clone());
                    }
                }
                CustomFieldPlacement::FieldArray => {
                    let values: Vec<JsonValue> = custom
                        .iter()
                        .map(|(field, value)| json!({ "field": field, "value": value }))
                        .collect();
                    payload.insert("fieldValues".to_string(), JsonValue::Array(values));
                }
                CustomFieldPlacement::CustomAttributes => {
                    payload.insert(
                        "custom_attributes".to_string(),
                        JsonValue::Object(custom.clone()),
                    );
                }
                CustomFieldPlacement::Attributes => {
                    payload.insert("attributes".to_string(), JsonValue::Object(custom.clone()));
                }
            }
            JsonValue::Object(payload)
        }
    }
}

/// Transforms a canonical event into the generic event envelope carried to
/// the provider adapter.
///
/// The timestamp defaults to the time of transformation when absent.
pub fn transform_event(
    event: &StandardEvent,
    identifier: &ContactIdentifier,
    provider: ProviderType,
) -> Result<JsonValue, TransformError> {
    if event.event_name.trim().is_empty() {
        return Err(TransformError::MissingField {
            field: "event_name",
        });
    }

    let timestamp = event.timestamp.unwrap_or_else(Utc::now);
    let mut envelope = Map::new();
    envelope.insert("event_name".to_string(), json!(event.event_name));
    envelope.insert("contact".to_string(), json!(identifier));
    envelope.insert(
        "properties".to_string(),
        JsonValue::Object(event.properties.clone()),
    );
    envelope.insert("timestamp".to_string(), json!(timestamp.to_rfc3339()));
    if let Some(value) = event.value {
        envelope.insert("value".to_string(), json!(value));
    }

    debug!(provider = %provider, event = %event.event_name, "event transformed");
    Ok(JsonValue::Object(envelope))
}
