//! Storage traits for the sync ledger and integrations.
//!
//! The daemon backs these with PostgreSQL; tests use in-memory
//! implementations.

use crate::attempt::SyncAttempt;
use crate::error::StoreError;
use crate::integration::{Integration, SyncStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_relay_core::{AccountId, IntegrationId};
use crm_relay_provider::ProviderType;

/// Storage for the sync attempt ledger.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Inserts a new attempt row.
    async fn insert(&self, attempt: &SyncAttempt) -> Result<(), StoreError>;

    /// Updates an existing attempt row.
    async fn update(&self, attempt: &SyncAttempt) -> Result<(), StoreError>;

    /// Atomically claims due retrying attempts, up to `limit`.
    ///
    /// A claim flips `retrying -> pending` and increments `retry_count` in
    /// the same statement, so concurrent sweeps can never both claim the
    /// same attempt. Returned attempts reflect the post-claim state.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SyncAttempt>, StoreError>;
}

/// Storage for integration records, as the dispatcher sees them.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Lists active integrations for an account, optionally filtered to one
    /// provider.
    async fn list_active(
        &self,
        account_id: AccountId,
        provider: Option<ProviderType>,
    ) -> Result<Vec<Integration>, StoreError>;

    /// Finds an integration by id, active or not.
    async fn find(&self, id: IntegrationId) -> Result<Option<Integration>, StoreError>;

    /// Records the outcome of a sync on the integration row: sync status,
    /// error message, and `last_sync_at` when the status is `connected`.
    async fn record_sync_outcome(
        &self,
        id: IntegrationId,
        status: SyncStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
