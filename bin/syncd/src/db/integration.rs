//! Repository for the `crm_integrations` table.

use super::{corrupted, store_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_relay_core::{AccountId, IntegrationId};
use crm_relay_provider::ProviderType;
use crm_relay_sync::{Integration, IntegrationStore, StoreError, SyncStatus};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for integration queries.
#[derive(FromRow)]
struct IntegrationRow {
    id: String,
    account_id: String,
    provider_type: String,
    encrypted_credentials: Vec<u8>,
    settings: JsonValue,
    is_active: bool,
    sync_status: String,
    sync_error: Option<String>,
    last_sync_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const INTEGRATION_COLUMNS: &str = "id, account_id, provider_type, encrypted_credentials, \
     settings, is_active, sync_status, sync_error, last_sync_at, created_at, updated_at";

impl IntegrationRow {
    fn try_into_integration(self) -> Result<Integration, StoreError> {
        let id = IntegrationId::from_str(&self.id)
            .map_err(|e| corrupted(format!("invalid integration id '{}': {e}", self.id)))?;
        let account_id = AccountId::from_str(&self.account_id)
            .map_err(|e| corrupted(format!("invalid account id '{}': {e}", self.account_id)))?;
        let provider_type = ProviderType::from_str(&self.provider_type)
            .map_err(|e| corrupted(e.to_string()))?;
        let sync_status = parse_sync_status(&self.sync_status)?;

        Ok(Integration {
            id,
            account_id,
            provider_type,
            encrypted_credentials: self.encrypted_credentials,
            settings: self.settings,
            is_active: self.is_active,
            sync_status,
            sync_error: self.sync_error,
            last_sync_at: self.last_sync_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_sync_status(s: &str) -> Result<SyncStatus, StoreError> {
    match s {
        "connected" => Ok(SyncStatus::Connected),
        "syncing" => Ok(SyncStatus::Syncing),
        "error" => Ok(SyncStatus::Error),
        "disconnected" => Ok(SyncStatus::Disconnected),
        other => Err(corrupted(format!("unknown sync status '{other}'"))),
    }
}

/// Repository for integration records.
#[derive(Clone)]
pub struct IntegrationRepository {
    pool: PgPool,
}

impl IntegrationRepository {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new integration.
    pub async fn insert(&self, integration: &Integration) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO crm_integrations
                (id, account_id, provider_type, encrypted_credentials, settings,
                 is_active, sync_status, sync_error, last_sync_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(integration.id.to_string())
        .bind(integration.account_id.to_string())
        .bind(integration.provider_type.as_str())
        .bind(&integration.encrypted_credentials)
        .bind(&integration.settings)
        .bind(integration.is_active)
        .bind(integration.sync_status.as_str())
        .bind(&integration.sync_error)
        .bind(integration.last_sync_at)
        .bind(integration.created_at)
        .bind(integration.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    /// Finds the integration for an (account, provider) pair, active or not.
    pub async fn find_by_account_provider(
        &self,
        account_id: AccountId,
        provider: ProviderType,
    ) -> Result<Option<Integration>, StoreError> {
        let row: Option<IntegrationRow> = sqlx::query_as(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM crm_integrations \
             WHERE account_id = $1 AND provider_type = $2"
        ))
        .bind(account_id.to_string())
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(IntegrationRow::try_into_integration).transpose()
    }

    /// Lists every integration for an account, active or not.
    pub async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Integration>, StoreError> {
        let rows: Vec<IntegrationRow> = sqlx::query_as(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM crm_integrations \
             WHERE account_id = $1 ORDER BY provider_type ASC"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(IntegrationRow::try_into_integration)
            .collect()
    }

    /// Rewrites credentials, settings and connection state on an existing
    /// row. Used to reconnect a disconnected integration in place.
    pub async fn update_connection(&self, integration: &Integration) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE crm_integrations
            SET encrypted_credentials = $2, settings = $3, is_active = $4,
                sync_status = $5, sync_error = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(integration.id.to_string())
        .bind(&integration.encrypted_credentials)
        .bind(&integration.settings)
        .bind(integration.is_active)
        .bind(integration.sync_status.as_str())
        .bind(&integration.sync_error)
        .bind(integration.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    /// Deactivates an integration. The row is kept so historical attempts
    /// retain a valid parent.
    pub async fn set_disconnected(
        &self,
        id: IntegrationId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE crm_integrations
            SET is_active = FALSE, sync_status = 'disconnected', sync_error = NULL,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}

#[async_trait]
impl IntegrationStore for IntegrationRepository {
    async fn list_active(
        &self,
        account_id: AccountId,
        provider: Option<ProviderType>,
    ) -> Result<Vec<Integration>, StoreError> {
        let rows: Vec<IntegrationRow> = match provider {
            Some(provider) => {
                sqlx::query_as(&format!(
                    "SELECT {INTEGRATION_COLUMNS} FROM crm_integrations \
                     WHERE account_id = $1 AND provider_type = $2 AND is_active"
                ))
                .bind(account_id.to_string())
                .bind(provider.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {INTEGRATION_COLUMNS} FROM crm_integrations \
                     WHERE account_id = $1 AND is_active ORDER BY provider_type ASC"
                ))
                .bind(account_id.to_string())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(store_error)?;

        rows.into_iter()
            .map(IntegrationRow::try_into_integration)
            .collect()
    }

    async fn find(&self, id: IntegrationId) -> Result<Option<Integration>, StoreError> {
        let row: Option<IntegrationRow> = sqlx::query_as(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM crm_integrations WHERE id = $1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(IntegrationRow::try_into_integration).transpose()
    }

    async fn record_sync_outcome(
        &self,
        id: IntegrationId,
        status: SyncStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE crm_integrations
            SET sync_status = $2, sync_error = $3,
                last_sync_at = CASE WHEN $2 = 'connected' THEN $4 ELSE last_sync_at END,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_round_trips_through_storage_names() {
        for status in [
            SyncStatus::Connected,
            SyncStatus::Syncing,
            SyncStatus::Error,
            SyncStatus::Disconnected,
        ] {
            assert_eq!(parse_sync_status(status.as_str()), Ok(status));
        }
        assert!(parse_sync_status("paused").is_err());
    }
}
