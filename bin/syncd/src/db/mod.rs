//! PostgreSQL-backed implementations of the sync storage traits.

mod integration;
mod sync_attempt;

pub use integration::IntegrationRepository;
pub use sync_attempt::SyncAttemptRepository;

use crm_relay_sync::StoreError;

fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Decode(source) => StoreError::Corrupted {
            reason: source.to_string(),
        },
        other => StoreError::QueryFailed {
            reason: other.to_string(),
        },
    }
}

fn corrupted(reason: impl Into<String>) -> StoreError {
    StoreError::Corrupted {
        reason: reason.into(),
    }
}
