//! Sync orchestration for crm-relay.
//!
//! This crate owns the fan-out of contact and event syncs across an
//! account's active integrations, the audit ledger of attempts, and the
//! retry machinery: exponential backoff with jitter and a background sweep
//! that re-dispatches due attempts. Storage sits behind traits so the
//! daemon can back them with PostgreSQL while tests stay in memory.

pub mod attempt;
pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod integration;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use attempt::{AttemptStatus, DEFAULT_MAX_RETRIES, SyncAttempt, SyncOperation};
pub use backoff::BackoffPolicy;
pub use dispatcher::{DispatchConfig, ProviderOutcome, SyncDispatcher, SyncReport};
pub use error::{StoreError, SyncError};
pub use integration::{Integration, SyncStatus};
pub use scheduler::{RetryScheduler, RetrySchedulerConfig, RetrySchedulerHandle};
pub use store::{AttemptStore, IntegrationStore};
