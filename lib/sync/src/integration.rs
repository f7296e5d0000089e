//! The stored CRM integration record.

use chrono::{DateTime, Utc};
use crm_relay_core::{AccountId, IntegrationId};
use crm_relay_provider::ProviderType;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// High-level sync status of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Connected and healthy.
    Connected,
    /// A sync is in flight.
    Syncing,
    /// The last sync failed.
    Error,
    /// Disconnected by the account.
    Disconnected,
}

impl SyncStatus {
    /// Returns the canonical string name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored CRM integration for one (account, provider) pair.
///
/// Credentials are held only in encrypted form; nothing in this struct ever
/// carries plaintext credential material.
#[derive(Clone)]
pub struct Integration {
    /// Integration id.
    pub id: IntegrationId,
    /// Owning account.
    pub account_id: AccountId,
    /// Provider this integration targets.
    pub provider_type: ProviderType,
    /// AES-256-GCM encrypted credential blob.
    pub encrypted_credentials: Vec<u8>,
    /// Provider-specific settings.
    pub settings: JsonValue,
    /// Active flag; disconnect clears it instead of deleting the row.
    pub is_active: bool,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// Last sync error message, when the status is `error`.
    pub sync_error: Option<String>,
    /// When the last successful sync completed.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// When the integration was created.
    pub created_at: DateTime<Utc>,
    /// When the integration was last updated.
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Integration")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("provider_type", &self.provider_type)
            .field(
                "encrypted_credentials",
                &format_args!("<{} bytes>", self.encrypted_credentials.len()),
            )
            .field("is_active", &self.is_active)
            .field("sync_status", &self.sync_status)
            .field("sync_error", &self.sync_error)
            .field("last_sync_at", &self.last_sync_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::Disconnected).expect("serialize"),
            "\"disconnected\""
        );
        assert_eq!(SyncStatus::Syncing.as_str(), "syncing");
    }

    #[test]
    fn debug_does_not_print_credential_bytes() {
        let integration = Integration {
            id: IntegrationId::new(),
            account_id: AccountId::new(),
            provider_type: ProviderType::Klaviyo,
            encrypted_credentials: vec![1, 2, 3, 4],
            settings: serde_json::json!({}),
            is_active: true,
            sync_status: SyncStatus::Connected,
            sync_error: None,
            last_sync_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let debug = format!("{integration:?}");
        assert!(debug.contains("<4 bytes>"));
        assert!(!debug.contains("[1, 2, 3, 4]"));
    }
}
