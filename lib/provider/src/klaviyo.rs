//! Klaviyo adapter.
//!
//! Authentication is an API key sent as `Authorization: Klaviyo-API-Key ...`
//! together with a pinned `revision` header. Contact upserts go through the
//! profile-import endpoint, which creates or updates by email server-side.

use crate::adapter::{CrmAdapter, parse_body, required_str, status_error, transport_error};
use crate::error::ProviderError;
use crate::types::{ContactIdentifier, ProviderResponse, ProviderType};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tracing::debug;

const API_BASE: &str = "https://a.klaviyo.com/api";
const API_REVISION: &str = "2025-10-15";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter for the Klaviyo REST API.
#[derive(Debug, Clone)]
pub struct KlaviyoAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl Default for KlaviyoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl KlaviyoAdapter {
    /// Creates an adapter against the public Klaviyo API.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Creates an adapter against a custom base URL.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
        builder
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", format!("Klaviyo-API-Key {api_key}"))
            .header("revision", API_REVISION)
            .header("Content-Type", "application/json")
    }
}

/// Wraps a mapped `{attributes, properties}` document in the profile-import
/// envelope.
fn profile_import_payload(payload: &JsonValue) -> JsonValue {
    let attributes = payload.get("attributes").cloned().unwrap_or_else(
        // A flat document is treated as attributes directly.
        || payload.clone(),
    );
    let mut data = json!({
        "type": "profile",
        "attributes": attributes,
    });
    if let Some(properties) = payload.get("properties")
        && properties.as_object().is_some_and(|m| !m.is_empty())
        && let Some(map) = data.as_object_mut()
    {
        map.insert("properties".to_string(), properties.clone());
    }
    json!({ "data": data })
}

/// Builds the event envelope: a metric, a profile reference and the event
/// attributes.
fn event_payload(identifier: &ContactIdentifier, payload: &JsonValue) -> JsonValue {
    let mut profile = json!({ "type": "profile" });
    if let Some(map) = profile.as_object_mut() {
        if let Some(id) = &identifier.id {
            map.insert("id".to_string(), json!(id));
        } else {
            let mut attributes = serde_json::Map::new();
            if let Some(email) = &identifier.email {
                attributes.insert("email".to_string(), json!(email));
            }
            if let Some(phone) = &identifier.phone {
                attributes.insert("phone_number".to_string(), json!(phone));
            }
            map.insert("attributes".to_string(), JsonValue::Object(attributes));
        }
    }

    let metric_name = payload
        .get("event_name")
        .and_then(JsonValue::as_str)
        .unwrap_or("Custom Event");

    let mut attributes = json!({
        "metric": {
            "data": {
                "type": "metric",
                "attributes": { "name": metric_name }
            }
        },
        "profile": { "data": profile },
    });
    if let Some(map) = attributes.as_object_mut() {
        if let Some(properties) = payload.get("properties").filter(|p| !p.is_null()) {
            map.insert("properties".to_string(), properties.clone());
        }
        if let Some(time) = payload.get("timestamp").filter(|t| !t.is_null()) {
            map.insert("time".to_string(), time.clone());
        }
        if let Some(value) = payload.get("value").filter(|v| !v.is_null()) {
            map.insert("value".to_string(), value.clone());
        }
    }

    json!({ "data": { "type": "event", "attributes": attributes } })
}

#[async_trait]
impl CrmAdapter for KlaviyoAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Klaviyo
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["api_key"]
    }

    async fn validate_credentials(&self, credentials: &JsonValue) -> Result<bool, ProviderError> {
        let api_key = required_str(credentials, "api_key")?;
        let url = format!("{}/profiles", self.base_url);

        let response = self
            .request(self.client.get(&url), api_key)
            .query(&[("page[size]", "1")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        Ok(true)
    }

    async fn create_or_update_contact(
        &self,
        credentials: &JsonValue,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError> {
        let api_key = required_str(credentials, "api_key")?;
        let url = format!("{}/profile-import", self.base_url);
        let body = profile_import_payload(payload);

        let response = self
            .request(self.client.post(&url), api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        if status >= 400 {
            return Err(status_error(status, text));
        }

        let body = parse_body(&text)?;
        let entity_id = body
            .pointer("/data/id")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        debug!(provider = "klaviyo", status, "profile imported");

        let mut result = ProviderResponse::new(status, body);
        if let Some(id) = entity_id {
            result = result.with_entity_id(id);
        }
        Ok(result)
    }

    async fn send_event(
        &self,
        credentials: &JsonValue,
        identifier: &ContactIdentifier,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError> {
        let api_key = required_str(credentials, "api_key")?;
        let url = format!("{}/events", self.base_url);
        let body = event_payload(identifier, payload);

        let response = self
            .request(self.client.post(&url), api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        if status >= 400 {
            return Err(status_error(status, text));
        }
        Ok(ProviderResponse::new(status, parse_body(&text)?))
    }

    async fn get_contact(
        &self,
        credentials: &JsonValue,
        identifier: &ContactIdentifier,
    ) -> Result<Option<JsonValue>, ProviderError> {
        let api_key = required_str(credentials, "api_key")?;

        let request = if let Some(id) = &identifier.id {
            let url = format!("{}/profiles/{id}", self.base_url);
            self.request(self.client.get(&url), api_key)
        } else {
            let filter = if let Some(email) = &identifier.email {
                format!("equals(email,\"{email}\")")
            } else if let Some(phone) = &identifier.phone {
                format!("equals(phone_number,\"{phone}\")")
            } else {
                return Err(ProviderError::InvalidResponse {
                    reason: "contact identifier is empty".to_string(),
                });
            };
            let url = format!("{}/profiles", self.base_url);
            self.request(self.client.get(&url), api_key)
                .query(&[("filter", filter.as_str())])
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        let text = response.text().await.map_err(transport_error)?;
        if status >= 400 {
            return Err(status_error(status, text));
        }

        let body = parse_body(&text)?;
        // Filter queries return a list; unwrap to the first match.
        if let Some(list) = body.get("data").and_then(JsonValue::as_array) {
            return Ok(list.first().cloned());
        }
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_import_wraps_attributes_and_properties() {
        let payload = json!({
            "attributes": {"email": "a@b.co", "phone_number": "+1234567890"},
            "properties": {"lead_score": 85},
        });
        let body = profile_import_payload(&payload);
        assert_eq!(body.pointer("/data/type"), Some(&json!("profile")));
        assert_eq!(
            body.pointer("/data/attributes/email"),
            Some(&json!("a@b.co"))
        );
        assert_eq!(body.pointer("/data/properties/lead_score"), Some(&json!(85)));
    }

    #[test]
    fn profile_import_omits_empty_properties() {
        let payload = json!({"attributes": {"email": "a@b.co"}, "properties": {}});
        let body = profile_import_payload(&payload);
        assert!(body.pointer("/data/properties").is_none());
    }

    #[test]
    fn event_payload_with_profile_id() {
        let identifier = ContactIdentifier::by_id("01ABC");
        let payload = json!({"event_name": "order_created", "value": 99.5});
        let body = event_payload(&identifier, &payload);
        assert_eq!(
            body.pointer("/data/attributes/profile/data/id"),
            Some(&json!("01ABC"))
        );
        assert_eq!(
            body.pointer("/data/attributes/metric/data/attributes/name"),
            Some(&json!("order_created"))
        );
        assert_eq!(body.pointer("/data/attributes/value"), Some(&json!(99.5)));
    }

    #[test]
    fn event_payload_with_email_identifier() {
        let identifier = ContactIdentifier::by_email("a@b.co");
        let payload = json!({"event_name": "page_viewed"});
        let body = event_payload(&identifier, &payload);
        assert_eq!(
            body.pointer("/data/attributes/profile/data/attributes/email"),
            Some(&json!("a@b.co"))
        );
        assert!(body.pointer("/data/attributes/profile/data/id").is_none());
    }
}
