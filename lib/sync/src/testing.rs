//! In-memory stores and a mock adapter for tests in this crate.

use crate::attempt::{AttemptStatus, SyncAttempt};
use crate::error::StoreError;
use crate::integration::{Integration, SyncStatus};
use crate::store::{AttemptStore, IntegrationStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_relay_core::{AccountId, IntegrationId};
use crm_relay_provider::{
    ContactIdentifier, CrmAdapter, ProviderError, ProviderResponse, ProviderType,
};
use crm_relay_vault::{EncryptionKey, encrypt_credentials};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Ledger store backed by a `Vec`, preserving insertion order.
#[derive(Default)]
pub(crate) struct InMemoryAttemptStore {
    rows: Mutex<Vec<SyncAttempt>>,
}

impl InMemoryAttemptStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn all(&self) -> Vec<SyncAttempt> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn insert(&self, attempt: &SyncAttempt) -> Result<(), StoreError> {
        self.rows.lock().unwrap().push(attempt.clone());
        Ok(())
    }

    async fn update(&self, attempt: &SyncAttempt) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|row| row.id == attempt.id) {
            Some(row) => {
                *row = attempt.clone();
                Ok(())
            }
            None => Err(StoreError::QueryFailed {
                reason: format!("no attempt row {}", attempt.id),
            }),
        }
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SyncAttempt>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let mut claimed = Vec::new();
        for row in rows.iter_mut() {
            if claimed.len() as u32 >= limit {
                break;
            }
            let due = row.status == AttemptStatus::Retrying
                && row.next_retry_at.is_some_and(|at| at <= now);
            if due {
                row.mark_claimed(now);
                claimed.push(row.clone());
            }
        }
        Ok(claimed)
    }
}

/// Integration store backed by a `HashMap`.
#[derive(Default)]
pub(crate) struct InMemoryIntegrationStore {
    rows: Mutex<HashMap<IntegrationId, Integration>>,
}

impl InMemoryIntegrationStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put(&self, integration: Integration) {
        self.rows.lock().unwrap().insert(integration.id, integration);
    }

    pub(crate) fn get(&self, id: IntegrationId) -> Option<Integration> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrationStore {
    async fn list_active(
        &self,
        account_id: AccountId,
        provider: Option<ProviderType>,
    ) -> Result<Vec<Integration>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|i| i.is_active && i.account_id == account_id)
            .filter(|i| provider.is_none_or(|p| i.provider_type == p))
            .cloned()
            .collect())
    }

    async fn find(&self, id: IntegrationId) -> Result<Option<Integration>, StoreError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn record_sync_outcome(
        &self,
        id: IntegrationId,
        status: SyncStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&id) {
            row.sync_status = status;
            row.sync_error = error;
            if status == SyncStatus::Connected {
                row.last_sync_at = Some(now);
            }
            row.updated_at = now;
        }
        Ok(())
    }
}

/// Builds an active integration with freshly encrypted credentials.
pub(crate) fn test_integration(
    account_id: AccountId,
    provider: ProviderType,
    key: &EncryptionKey,
    credentials: &JsonValue,
) -> Integration {
    let now = Utc::now();
    Integration {
        id: IntegrationId::new(),
        account_id,
        provider_type: provider,
        encrypted_credentials: encrypt_credentials(key, credentials).expect("encrypt"),
        settings: json!({}),
        is_active: true,
        sync_status: SyncStatus::Connected,
        sync_error: None,
        last_sync_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Scripted adapter: succeeds or fails with a fixed error, optionally after
/// a delay, and counts its calls.
pub(crate) struct MockAdapter {
    provider: ProviderType,
    fail_with: Option<ProviderError>,
    delay: Option<Duration>,
    entity_id: Option<String>,
    calls: AtomicUsize,
}

impl MockAdapter {
    pub(crate) fn succeeding(provider: ProviderType) -> Self {
        Self {
            provider,
            fail_with: None,
            delay: None,
            entity_id: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(provider: ProviderType, error: ProviderError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::succeeding(provider)
        }
    }

    pub(crate) fn with_entity_id(mut self, entity_id: &str) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        let mut response = ProviderResponse::new(200, json!({"ok": true}));
        if let Some(entity_id) = &self.entity_id {
            response = response.with_entity_id(entity_id.clone());
        }
        Ok(response)
    }
}

#[async_trait]
impl CrmAdapter for MockAdapter {
    fn provider_type(&self) -> ProviderType {
        self.provider
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &[]
    }

    async fn validate_credentials(&self, _credentials: &JsonValue) -> Result<bool, ProviderError> {
        Ok(self.fail_with.is_none())
    }

    async fn create_or_update_contact(
        &self,
        _credentials: &JsonValue,
        _payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError> {
        self.respond().await
    }

    async fn send_event(
        &self,
        _credentials: &JsonValue,
        _identifier: &ContactIdentifier,
        _payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError> {
        self.respond().await
    }

    async fn get_contact(
        &self,
        _credentials: &JsonValue,
        _identifier: &ContactIdentifier,
    ) -> Result<Option<JsonValue>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}
