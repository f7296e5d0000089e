//! Integration lifecycle: validate, connect, status, disconnect, list.
//!
//! Credentials pass through this service exactly once, at connect time:
//! validated against the live provider, encrypted, and stored. They are
//! never logged and never returned.

use crate::db::IntegrationRepository;
use chrono::{DateTime, Utc};
use crm_relay_core::{AccountId, IntegrationId};
use crm_relay_provider::{ProviderError, ProviderRegistry, ProviderType};
use crm_relay_sync::{Integration, StoreError, SyncStatus};
use crm_relay_vault::{CredentialError, EncryptionKey, encrypt_credentials};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Errors from integration lifecycle operations.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// No adapter exists for the requested provider.
    Unsupported { provider: ProviderType },
    /// The supplied credentials are incomplete or were rejected.
    InvalidCredentials { reason: String },
    /// An active integration for this (account, provider) already exists.
    Conflict { provider: ProviderType },
    /// No integration exists for this (account, provider).
    NotFound { provider: ProviderType },
    /// The provider call failed for a non-credential reason.
    Provider(ProviderError),
    /// Credential encryption failed.
    Credential(CredentialError),
    /// The database failed.
    Database { reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { provider } => {
                write!(f, "unsupported provider: {provider}")
            }
            Self::InvalidCredentials { reason } => {
                write!(f, "invalid credentials: {reason}")
            }
            Self::Conflict { provider } => {
                write!(f, "an active {provider} integration already exists")
            }
            Self::NotFound { provider } => {
                write!(f, "no {provider} integration found")
            }
            Self::Provider(err) => write!(f, "provider call failed: {err}"),
            Self::Credential(err) => write!(f, "credential error: {err}"),
            Self::Database { reason } => write!(f, "database error: {reason}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<ProviderError> for RegistryError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnsupportedProvider { provider } => Self::Unsupported { provider },
            ProviderError::MissingCredential { field } => Self::InvalidCredentials {
                reason: format!("missing credential field: {field}"),
            },
            ProviderError::AuthenticationFailed { reason } => {
                Self::InvalidCredentials { reason }
            }
            other => Self::Provider(other),
        }
    }
}

impl From<CredentialError> for RegistryError {
    fn from(err: CredentialError) -> Self {
        Self::Credential(err)
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        Self::Database {
            reason: err.to_string(),
        }
    }
}

/// Connection state of one integration, as reported to callers. Carries no
/// credential material.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationStatusView {
    /// Integration id.
    pub id: IntegrationId,
    /// Provider this integration targets.
    pub provider: ProviderType,
    /// Whether the integration is active.
    pub is_active: bool,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// Last sync error, when the status is `error`.
    pub sync_error: Option<String>,
    /// When the last successful sync completed.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// When the integration was created.
    pub created_at: DateTime<Utc>,
}

impl From<&Integration> for IntegrationStatusView {
    fn from(integration: &Integration) -> Self {
        Self {
            id: integration.id,
            provider: integration.provider_type,
            is_active: integration.is_active,
            sync_status: integration.sync_status,
            sync_error: integration.sync_error.clone(),
            last_sync_at: integration.last_sync_at,
            created_at: integration.created_at,
        }
    }
}

/// Service over the persisted integrations of all accounts.
#[derive(Clone)]
pub struct IntegrationRegistry {
    providers: Arc<ProviderRegistry>,
    repository: IntegrationRepository,
    encryption_key: EncryptionKey,
}

impl IntegrationRegistry {
    /// Creates the registry service.
    #[must_use]
    pub fn new(
        providers: Arc<ProviderRegistry>,
        repository: IntegrationRepository,
        encryption_key: EncryptionKey,
    ) -> Self {
        Self {
            providers,
            repository,
            encryption_key,
        }
    }

    /// Dry-runs credentials against the live provider. Nothing is
    /// persisted.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unsupported`] for providers with no
    /// adapter and [`RegistryError::InvalidCredentials`] when required
    /// fields are absent or the provider rejects them.
    pub async fn validate(
        &self,
        provider: ProviderType,
        credentials: &JsonValue,
    ) -> Result<(), RegistryError> {
        let adapter = self.providers.adapter(provider)?;
        if !adapter.validate_credentials(credentials).await? {
            return Err(RegistryError::InvalidCredentials {
                reason: format!("{provider} rejected the credentials"),
            });
        }
        Ok(())
    }

    /// Validates, encrypts and stores credentials for an account.
    ///
    /// A disconnected prior integration for the same (account, provider)
    /// pair is reactivated in place with the new credentials; an active one
    /// is a [`RegistryError::Conflict`].
    pub async fn connect(
        &self,
        account_id: AccountId,
        provider: ProviderType,
        credentials: &JsonValue,
        settings: JsonValue,
    ) -> Result<IntegrationStatusView, RegistryError> {
        self.validate(provider, credentials).await?;
        let encrypted = encrypt_credentials(&self.encryption_key, credentials)?;

        let existing = self
            .repository
            .find_by_account_provider(account_id, provider)
            .await?;
        let now = Utc::now();

        let integration = match existing {
            Some(existing) if existing.is_active => {
                return Err(RegistryError::Conflict { provider });
            }
            Some(mut inactive) => {
                inactive.encrypted_credentials = encrypted;
                inactive.settings = settings;
                inactive.is_active = true;
                inactive.sync_status = SyncStatus::Connected;
                inactive.sync_error = None;
                inactive.updated_at = now;
                self.repository.update_connection(&inactive).await?;
                info!(
                    account_id = %account_id,
                    provider = %provider,
                    integration_id = %inactive.id,
                    "integration reconnected"
                );
                inactive
            }
            None => {
                let integration = Integration {
                    id: IntegrationId::new(),
                    account_id,
                    provider_type: provider,
                    encrypted_credentials: encrypted,
                    settings,
                    is_active: true,
                    sync_status: SyncStatus::Connected,
                    sync_error: None,
                    last_sync_at: None,
                    created_at: now,
                    updated_at: now,
                };
                self.repository.insert(&integration).await?;
                info!(
                    account_id = %account_id,
                    provider = %provider,
                    integration_id = %integration.id,
                    "integration connected"
                );
                integration
            }
        };

        Ok(IntegrationStatusView::from(&integration))
    }

    /// Reports the connection state of one integration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no integration exists for
    /// the pair, active or not.
    pub async fn status(
        &self,
        account_id: AccountId,
        provider: ProviderType,
    ) -> Result<IntegrationStatusView, RegistryError> {
        let integration = self
            .repository
            .find_by_account_provider(account_id, provider)
            .await?
            .ok_or(RegistryError::NotFound { provider })?;
        Ok(IntegrationStatusView::from(&integration))
    }

    /// Deactivates an integration. The row and its attempt history are
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no active integration
    /// exists for the pair.
    pub async fn disconnect(
        &self,
        account_id: AccountId,
        provider: ProviderType,
    ) -> Result<(), RegistryError> {
        let integration = self
            .repository
            .find_by_account_provider(account_id, provider)
            .await?
            .filter(|i| i.is_active)
            .ok_or(RegistryError::NotFound { provider })?;

        self.repository
            .set_disconnected(integration.id, Utc::now())
            .await?;
        info!(
            account_id = %account_id,
            provider = %provider,
            integration_id = %integration.id,
            "integration disconnected"
        );
        Ok(())
    }

    /// Lists every integration of an account, active or not.
    pub async fn list(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<IntegrationStatusView>, RegistryError> {
        let integrations = self.repository.list_for_account(account_id).await?;
        Ok(integrations.iter().map(IntegrationStatusView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_registry_variants() {
        let err = RegistryError::from(ProviderError::UnsupportedProvider {
            provider: ProviderType::Hubspot,
        });
        assert_eq!(
            err,
            RegistryError::Unsupported {
                provider: ProviderType::Hubspot
            }
        );

        let err = RegistryError::from(ProviderError::MissingCredential { field: "api_key" });
        assert!(matches!(err, RegistryError::InvalidCredentials { .. }));

        let err = RegistryError::from(ProviderError::AuthenticationFailed {
            reason: "bad key".to_string(),
        });
        assert!(matches!(err, RegistryError::InvalidCredentials { .. }));

        let err = RegistryError::from(ProviderError::Timeout);
        assert!(matches!(err, RegistryError::Provider(_)));
    }

    #[test]
    fn conflict_message_names_the_provider() {
        let err = RegistryError::Conflict {
            provider: ProviderType::Klaviyo,
        };
        assert_eq!(err.to_string(), "an active klaviyo integration already exists");
    }
}
