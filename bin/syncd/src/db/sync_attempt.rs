//! Repository for the `sync_attempts` ledger table.

use super::{corrupted, store_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_relay_core::{AccountId, IntegrationId, SyncAttemptId};
use crm_relay_provider::ProviderType;
use crm_relay_sync::{AttemptStatus, AttemptStore, StoreError, SyncAttempt, SyncOperation};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for ledger queries.
#[derive(FromRow)]
struct SyncAttemptRow {
    id: String,
    integration_id: String,
    account_id: String,
    provider_type: String,
    operation: String,
    entity_type: String,
    entity_id: Option<String>,
    request_payload: JsonValue,
    response_payload: Option<JsonValue>,
    provider_entity_id: Option<String>,
    status: String,
    status_code: Option<i32>,
    error_message: Option<String>,
    retry_count: i32,
    max_retries: i32,
    next_retry_at: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
}

const ATTEMPT_COLUMNS: &str = "id, integration_id, account_id, provider_type, operation, \
     entity_type, entity_id, request_payload, response_payload, provider_entity_id, \
     status, status_code, error_message, retry_count, max_retries, next_retry_at, \
     started_at, completed_at, duration_ms";

impl SyncAttemptRow {
    fn try_into_attempt(self) -> Result<SyncAttempt, StoreError> {
        let id = SyncAttemptId::from_str(&self.id)
            .map_err(|e| corrupted(format!("invalid attempt id '{}': {e}", self.id)))?;
        let integration_id = IntegrationId::from_str(&self.integration_id).map_err(|e| {
            corrupted(format!("invalid integration id '{}': {e}", self.integration_id))
        })?;
        let account_id = AccountId::from_str(&self.account_id)
            .map_err(|e| corrupted(format!("invalid account id '{}': {e}", self.account_id)))?;
        let provider_type = ProviderType::from_str(&self.provider_type)
            .map_err(|e| corrupted(e.to_string()))?;
        let operation = parse_operation(&self.operation)?;
        let status = parse_status(&self.status)?;
        let status_code = self
            .status_code
            .map(|code| {
                u16::try_from(code)
                    .map_err(|_| corrupted(format!("status code {code} out of range")))
            })
            .transpose()?;
        let retry_count = u32::try_from(self.retry_count)
            .map_err(|_| corrupted(format!("negative retry count {}", self.retry_count)))?;
        let max_retries = u32::try_from(self.max_retries)
            .map_err(|_| corrupted(format!("negative retry budget {}", self.max_retries)))?;

        Ok(SyncAttempt {
            id,
            integration_id,
            account_id,
            provider_type,
            operation,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            request_payload: self.request_payload,
            response_payload: self.response_payload,
            provider_entity_id: self.provider_entity_id,
            status,
            status_code,
            error_message: self.error_message,
            retry_count,
            max_retries,
            next_retry_at: self.next_retry_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration_ms,
        })
    }
}

fn parse_status(s: &str) -> Result<AttemptStatus, StoreError> {
    match s {
        "pending" => Ok(AttemptStatus::Pending),
        "success" => Ok(AttemptStatus::Success),
        "failed" => Ok(AttemptStatus::Failed),
        "retrying" => Ok(AttemptStatus::Retrying),
        other => Err(corrupted(format!("unknown attempt status '{other}'"))),
    }
}

fn parse_operation(s: &str) -> Result<SyncOperation, StoreError> {
    match s {
        "create_or_update_contact" => Ok(SyncOperation::CreateOrUpdateContact),
        "send_event" => Ok(SyncOperation::SendEvent),
        other => Err(corrupted(format!("unknown sync operation '{other}'"))),
    }
}

/// Repository for sync attempt rows.
#[derive(Clone)]
pub struct SyncAttemptRepository {
    pool: PgPool,
}

impl SyncAttemptRepository {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lists attempts for an integration, newest first.
    pub async fn list_for_integration(
        &self,
        integration_id: IntegrationId,
        limit: u32,
    ) -> Result<Vec<SyncAttempt>, StoreError> {
        let rows: Vec<SyncAttemptRow> = sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM sync_attempts \
             WHERE integration_id = $1 ORDER BY started_at DESC LIMIT $2"
        ))
        .bind(integration_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(SyncAttemptRow::try_into_attempt)
            .collect()
    }
}

#[async_trait]
impl AttemptStore for SyncAttemptRepository {
    async fn insert(&self, attempt: &SyncAttempt) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_attempts
                (id, integration_id, account_id, provider_type, operation,
                 entity_type, entity_id, request_payload, response_payload,
                 provider_entity_id, status, status_code, error_message,
                 retry_count, max_retries, next_retry_at, started_at,
                 completed_at, duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(attempt.id.to_string())
        .bind(attempt.integration_id.to_string())
        .bind(attempt.account_id.to_string())
        .bind(attempt.provider_type.as_str())
        .bind(attempt.operation.as_str())
        .bind(&attempt.entity_type)
        .bind(&attempt.entity_id)
        .bind(&attempt.request_payload)
        .bind(&attempt.response_payload)
        .bind(&attempt.provider_entity_id)
        .bind(attempt.status.as_str())
        .bind(attempt.status_code.map(i32::from))
        .bind(&attempt.error_message)
        .bind(i32::try_from(attempt.retry_count).unwrap_or(i32::MAX))
        .bind(i32::try_from(attempt.max_retries).unwrap_or(i32::MAX))
        .bind(attempt.next_retry_at)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .bind(attempt.duration_ms)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn update(&self, attempt: &SyncAttempt) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE sync_attempts
            SET response_payload = $2, provider_entity_id = $3, status = $4,
                status_code = $5, error_message = $6, retry_count = $7,
                next_retry_at = $8, started_at = $9, completed_at = $10,
                duration_ms = $11
            WHERE id = $1
            "#,
        )
        .bind(attempt.id.to_string())
        .bind(&attempt.response_payload)
        .bind(&attempt.provider_entity_id)
        .bind(attempt.status.as_str())
        .bind(attempt.status_code.map(i32::from))
        .bind(&attempt.error_message)
        .bind(i32::try_from(attempt.retry_count).unwrap_or(i32::MAX))
        .bind(attempt.next_retry_at)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .bind(attempt.duration_ms)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SyncAttempt>, StoreError> {
        // SKIP LOCKED keeps concurrent sweeps from claiming the same row;
        // the flip to pending and the retry count move in the same
        // statement.
        let rows: Vec<SyncAttemptRow> = sqlx::query_as(&format!(
            r#"
            UPDATE sync_attempts
            SET status = 'pending', retry_count = retry_count + 1,
                next_retry_at = NULL, started_at = $1,
                completed_at = NULL, duration_ms = NULL
            WHERE id IN (
                SELECT id FROM sync_attempts
                WHERE status = 'retrying' AND next_retry_at <= $1
                ORDER BY next_retry_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(SyncAttemptRow::try_into_attempt)
            .collect()
    }
}
