//! Creatio adapter.
//!
//! Talks OData 4 at `{instance_url}/0/odata` with Basic authentication.
//! Contact upserts filter by `Email` and PATCH or POST the `Contact` entity;
//! events create `Activity` records linked through `ContactId`.

use crate::adapter::{CrmAdapter, parse_body, required_str, status_error, transport_error};
use crate::error::ProviderError;
use crate::types::{ContactIdentifier, ProviderResponse, ProviderType};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tracing::{debug, info};

const ODATA_PATH: &str = "/0/odata";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Adapter for the Creatio OData 4 API.
#[derive(Debug, Clone, Default)]
pub struct CreatioAdapter {
    client: reqwest::Client,
}

impl CreatioAdapter {
    /// Creates a Creatio adapter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn odata_url(credentials: &JsonValue, entity: &str) -> Result<String, ProviderError> {
        let instance_url = required_str(credentials, "instance_url")?;
        Ok(format!(
            "{}{ODATA_PATH}/{entity}",
            instance_url.trim_end_matches('/')
        ))
    }

    fn request(
        &self,
        builder: reqwest::RequestBuilder,
        credentials: &JsonValue,
    ) -> Result<reqwest::RequestBuilder, ProviderError> {
        let username = required_str(credentials, "username")?;
        let password = required_str(credentials, "password")?;
        let token = BASE64.encode(format!("{username}:{password}"));
        Ok(builder
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", format!("Basic {token}"))
            .header("Content-Type", "application/json;odata=verbose")
            .header("Accept", "application/json;odata=verbose"))
    }

    /// Finds a Contact id by email, `None` when absent.
    async fn find_contact_id(
        &self,
        credentials: &JsonValue,
        email: &str,
    ) -> Result<Option<String>, ProviderError> {
        let url = Self::odata_url(credentials, "Contact")?;
        let filter = format!("Email eq '{}'", escape_odata(email));
        let response = self
            .request(self.client.get(&url), credentials)?
            .query(&[("$filter", filter.as_str()), ("$select", "Id"), ("$top", "1")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        if status >= 400 {
            return Err(status_error(status, text));
        }

        let body = parse_body(&text)?;
        Ok(body
            .pointer("/value/0/Id")
            .and_then(JsonValue::as_str)
            .map(str::to_string))
    }
}

/// Escapes a string literal for an OData quoted value.
fn escape_odata(value: &str) -> String {
    value.replace('\'', "''")
}

/// Builds an Activity record from the generic event envelope.
fn activity_payload(contact_id: &str, payload: &JsonValue) -> JsonValue {
    let title = payload
        .get("event_name")
        .and_then(JsonValue::as_str)
        .unwrap_or("Activity");
    let notes = payload
        .get("properties")
        .filter(|p| p.as_object().is_some_and(|m| !m.is_empty()))
        .map(std::string::ToString::to_string)
        .unwrap_or_default();

    let mut activity = json!({
        "ContactId": contact_id,
        "Title": title,
        "Notes": notes,
    });
    if let Some(ts) = payload.get("timestamp").filter(|t| t.is_string())
        && let Some(map) = activity.as_object_mut()
    {
        map.insert("StartDate".to_string(), ts.clone());
    }
    activity
}

#[async_trait]
impl CrmAdapter for CreatioAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Creatio
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["instance_url", "username", "password"]
    }

    async fn validate_credentials(&self, credentials: &JsonValue) -> Result<bool, ProviderError> {
        let url = Self::odata_url(credentials, "SysSettings")?;
        let response = self
            .request(self.client.get(&url), credentials)?
            .query(&[("$top", "1")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        info!(provider = "creatio", "credentials validated");
        Ok(true)
    }

    async fn create_or_update_contact(
        &self,
        credentials: &JsonValue,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError> {
        let email = payload.get("Email").and_then(JsonValue::as_str);

        let existing = match email {
            Some(email) => self.find_contact_id(credentials, email).await?,
            None => None,
        };

        let (response, known_id) = match existing {
            Some(contact_id) => {
                let url = format!(
                    "{}(guid'{contact_id}')",
                    Self::odata_url(credentials, "Contact")?
                );
                let response = self
                    .request(self.client.patch(&url), credentials)?
                    .json(payload)
                    .send()
                    .await
                    .map_err(transport_error)?;
                (response, Some(contact_id))
            }
            None => {
                let url = Self::odata_url(credentials, "Contact")?;
                let response = self
                    .request(self.client.post(&url), credentials)?
                    .json(payload)
                    .send()
                    .await
                    .map_err(transport_error)?;
                (response, None)
            }
        };

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        if status >= 400 {
            return Err(status_error(status, text));
        }

        let body = parse_body(&text)?;
        let entity_id = known_id.or_else(|| {
            body.get("Id")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        });
        debug!(provider = "creatio", status, "contact upserted");

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
        let contact_id = match (&identifier.id, &identifier.email) {
            (Some(id), _) => id.clone(),
            (None, Some(email)) => self
                .find_contact_id(credentials, email)
                .await?
                .ok_or_else(|| ProviderError::InvalidPayload {
                    reason: format!("contact not found: {email}"),
                })?,
            (None, None) => {
                return Err(ProviderError::InvalidPayload {
                    reason: "contact id or email is required".to_string(),
                });
            }
        };

        let activity = activity_payload(&contact_id, payload);
        let url = Self::odata_url(credentials, "Activity")?;
        let response = self
            .request(self.client.post(&url), credentials)?
            .json(&activity)
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
            .get("Id")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        let mut result = ProviderResponse::new(status, body);
        if let Some(id) = entity_id {
            result = result.with_entity_id(id);
        }
        Ok(result)
    }

    async fn get_contact(
        &self,
        credentials: &JsonValue,
        identifier: &ContactIdentifier,
    ) -> Result<Option<JsonValue>, ProviderError> {
        if let Some(id) = &identifier.id {
            let url = format!("{}(guid'{id}')", Self::odata_url(credentials, "Contact")?);
            let response = self
                .request(self.client.get(&url), credentials)?
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status().as_u16();
            if status == 404 {
                return Ok(None);
            }
            let text = response.text().await.map_err(transport_error)?;
            if status >= 400 {
                return Err(status_error(status, text));
            }
            return Ok(Some(parse_body(&text)?));
        }

        let Some(email) = &identifier.email else {
            return Err(ProviderError::InvalidPayload {
                reason: "contact id or email is required".to_string(),
            });
        };

        let url = Self::odata_url(credentials, "Contact")?;
        let filter = format!("Email eq '{}'", escape_odata(email));
        let response = self
            .request(self.client.get(&url), credentials)?
            .query(&[("$filter", filter.as_str()), ("$top", "1")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        if status >= 400 {
            return Err(status_error(status, text));
        }

        let body = parse_body(&text)?;
        Ok(body
            .get("value")
            .and_then(JsonValue::as_array)
            .and_then(|contacts| contacts.first().cloned()))
    }
}
