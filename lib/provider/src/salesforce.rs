//! Salesforce adapter.
//!
//! Works against the REST API (v60.0) with a bearer token. Credentials carry
//! either `access_token` + `instance_url` directly, or the OAuth 2.0
//! password-flow fields (`client_id`, `client_secret`, `username`,
//! `password`, optional `security_token`, optional `domain`) from which a
//! session is obtained per call. Contact upserts query by email via SOQL and
//! PATCH or POST the `Contact` sobject; events become `Task` records linked
//! through `WhoId`.

use crate::adapter::{
    CrmAdapter, optional_str, parse_body, required_str, status_error, transport_error,
};
use crate::error::ProviderError;
use crate::types::{ContactIdentifier, ProviderResponse, ProviderType};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tracing::{debug, info};

const API_VERSION: &str = "v60.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const AUTH_TIMEOUT: Duration = Duration::from_secs(15);

/// Adapter for the Salesforce REST API.
#[derive(Debug, Clone)]
pub struct SalesforceAdapter {
    client: reqwest::Client,
    /// Overrides the `https://{domain}.salesforce.com` login host in tests.
    login_url_override: Option<String>,
}

/// An authenticated Salesforce session.
struct Session {
    access_token: String,
    instance_url: String,
}

impl Session {
    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/{API_VERSION}/{path}",
            self.instance_url.trim_end_matches('/')
        )
    }
}

impl Default for SalesforceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SalesforceAdapter {
    /// Creates an adapter against the public Salesforce endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            login_url_override: None,
        }
    }

    /// Creates an adapter that authenticates against a custom login URL.
    #[must_use]
    pub fn with_login_url(login_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            login_url_override: Some(login_url.into()),
        }
    }

    /// Resolves a session from credentials: a direct token when present,
    /// otherwise the OAuth password flow.
    async fn session(&self, credentials: &JsonValue) -> Result<Session, ProviderError> {
        if let (Some(token), Some(instance)) = (
            optional_str(credentials, "access_token"),
            optional_str(credentials, "instance_url"),
        ) {
            return Ok(Session {
                access_token: token.to_string(),
                instance_url: instance.to_string(),
            });
        }

        let client_id = required_str(credentials, "client_id")?;
        let client_secret = required_str(credentials, "client_secret")?;
        let username = required_str(credentials, "username")?;
        let password = required_str(credentials, "password")?;
        let security_token = optional_str(credentials, "security_token").unwrap_or_default();
        let domain = optional_str(credentials, "domain").unwrap_or("login");

        let auth_url = match &self.login_url_override {
            Some(url) => format!("{}/services/oauth2/token", url.trim_end_matches('/')),
            None => format!("https://{domain}.salesforce.com/services/oauth2/token"),
        };

        // Salesforce expects the security token appended to the password.
        let form = [
            ("grant_type", "password"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("username", username),
            ("password", &format!("{password}{security_token}")),
        ];

        let response = self
            .client
            .post(&auth_url)
            .timeout(AUTH_TIMEOUT)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;

        if status == 400 {
            let reason = parse_body(&text)
                .ok()
                .and_then(|b| {
                    b.get("error_description")
                        .and_then(JsonValue::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "invalid credentials".to_string());
            return Err(ProviderError::AuthenticationFailed { reason });
        }
        if status >= 400 {
            return Err(status_error(status, text));
        }

        let body = parse_body(&text)?;
        let access_token = body
            .get("access_token")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse {
                reason: "token response missing access_token".to_string(),
            })?;
        let instance_url = body
            .get("instance_url")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse {
                reason: "token response missing instance_url".to_string(),
            })?;

        Ok(Session {
            access_token: access_token.to_string(),
            instance_url: instance_url.to_string(),
        })
    }

    fn request(
        &self,
        builder: reqwest::RequestBuilder,
        session: &Session,
    ) -> reqwest::RequestBuilder {
        builder
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
    }

    /// Finds a Contact id by email, `None` when absent.
    async fn find_contact_id(
        &self,
        session: &Session,
        email: &str,
    ) -> Result<Option<String>, ProviderError> {
        let query = format!(
            "SELECT Id FROM Contact WHERE Email = '{}' LIMIT 1",
            escape_soql(email)
        );
        let response = self
            .request(self.client.get(session.data_url("query")), session)
            .query(&[("q", query.as_str())])
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
            .pointer("/records/0/Id")
            .and_then(JsonValue::as_str)
            .map(str::to_string))
    }
}

/// Escapes a string literal for use inside a SOQL quoted value.
fn escape_soql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Builds a Task record from the generic event envelope.
fn task_payload(contact_id: &str, payload: &JsonValue) -> JsonValue {
    let subject = payload
        .get("event_name")
        .and_then(JsonValue::as_str)
        .unwrap_or("Activity");
    let description = payload
        .get("properties")
        .filter(|p| p.as_object().is_some_and(|m| !m.is_empty()))
        .map(std::string::ToString::to_string)
        .unwrap_or_default();

    let mut task = json!({
        "WhoId": contact_id,
        "Subject": subject,
        "Description": description,
        "Status": "Completed",
        "Priority": "Normal",
    });
    // ActivityDate is a date field; keep the date part of the timestamp.
    if let Some(ts) = payload.get("timestamp").and_then(JsonValue::as_str)
        && ts.len() >= 10
        && let Some(map) = task.as_object_mut()
    {
        map.insert("ActivityDate".to_string(), json!(&ts[..10]));
    }
    task
}

#[async_trait]
impl CrmAdapter for SalesforceAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Salesforce
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        // Either a direct token pair or the OAuth password-flow fields;
        // the direct pair is the canonical minimum.
        &["access_token", "instance_url"]
    }

    async fn validate_credentials(&self, credentials: &JsonValue) -> Result<bool, ProviderError> {
        let session = self.session(credentials).await?;

        let response = self
            .request(self.client.get(session.data_url("limits")), &session)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        info!(provider = "salesforce", "credentials validated");
        Ok(true)
    }

    async fn create_or_update_contact(
        &self,
        credentials: &JsonValue,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError> {
        let session = self.session(credentials).await?;

        let email = payload
            .get("Email")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ProviderError::InvalidPayload {
                reason: "contact payload missing Email".to_string(),
            })?;

        let existing = self.find_contact_id(&session, email).await?;

        let (response, known_id) = match existing {
            Some(contact_id) => {
                let url = session.data_url(&format!("sobjects/Contact/{contact_id}"));
                let response = self
                    .request(self.client.patch(&url), &session)
                    .json(payload)
                    .send()
                    .await
                    .map_err(transport_error)?;
                (response, Some(contact_id))
            }
            None => {
                let url = session.data_url("sobjects/Contact");
                let response = self
                    .request(self.client.post(&url), &session)
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

        // PATCH answers 204 with an empty body; POST returns the new id.
        let body = parse_body(&text)?;
        let entity_id = known_id.or_else(|| {
            body.get("id")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        });
        debug!(provider = "salesforce", status, "contact upserted");

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
        let session = self.session(credentials).await?;

        let contact_id = match (&identifier.id, &identifier.email) {
            (Some(id), _) => id.clone(),
            (None, Some(email)) => self.find_contact_id(&session, email).await?.ok_or_else(
                || ProviderError::InvalidPayload {
                    reason: format!("contact not found: {email}"),
                },
            )?,
            (None, None) => {
                return Err(ProviderError::InvalidPayload {
                    reason: "contact id or email is required".to_string(),
                });
            }
        };

        let task = task_payload(&contact_id, payload);
        let url = session.data_url("sobjects/Task");
        let response = self
            .request(self.client.post(&url), &session)
            .json(&task)
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
            .get("id")
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
        let session = self.session(credentials).await?;

        if let Some(id) = &identifier.id {
            let url = session.data_url(&format!("sobjects/Contact/{id}"));
            let response = self
                .request(self.client.get(&url), &session)
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

        let query = format!(
            "SELECT Id, FirstName, LastName, Email, Phone, MobilePhone \
             FROM Contact WHERE Email = '{}' LIMIT 1",
            escape_soql(email)
        );
        let response = self
            .request(self.client.get(session.data_url("query")), &session)
            .query(&[("q", query.as_str())])
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
            .get("records")
            .and_then(JsonValue::as_array)
            .and_then(|records| records.first().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_soql_quotes() {
        assert_eq!(escape_soql("o'brien@x.co"), "o\\'brien@x.co");
        assert_eq!(escape_soql("plain@x.co"), "plain@x.co");
    }

    #[test]
    fn task_payload_maps_event_envelope() {
        let payload = json!({
            "event_name": "order_created",
            "properties": {"order_id": "ORD-1"},
            "timestamp": "2026-08-26T10:30:00Z",
        });
        let task = task_payload("003XX0000000001", &payload);
        assert_eq!(task["WhoId"], json!("003XX0000000001"));
        assert_eq!(task["Subject"], json!("order_created"));
        assert_eq!(task["Status"], json!("Completed"));
        assert_eq!(task["ActivityDate"], json!("2026-08-26"));
        assert!(
            task["Description"]
                .as_str()
                .is_some_and(|d| d.contains("ORD-1"))
        );
    }

    #[test]
    fn task_payload_defaults() {
        let task = task_payload("003X", &json!({}));
        assert_eq!(task["Subject"], json!("Activity"));
        assert!(task.get("ActivityDate").is_none());
    }

    #[test]
    fn session_url_building() {
        let session = Session {
            access_token: "tok".to_string(),
            instance_url: "https://acme.my.salesforce.com/".to_string(),
        };
        assert_eq!(
            session.data_url("limits"),
            "https://acme.my.salesforce.com/services/data/v60.0/limits"
        );
    }
}
