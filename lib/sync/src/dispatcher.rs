//! The sync dispatcher: fans one request out across active integrations.
//!
//! Each matching integration runs as an independent task; one provider's
//! failure never aborts the others. Every dispatch writes exactly one
//! ledger row before the provider is called, and resolves it on every exit
//! path. Credentials are decrypted just-in-time and dropped right after the
//! provider call returns.

use crate::attempt::{AttemptStatus, SyncAttempt, SyncOperation};
use crate::backoff::BackoffPolicy;
use crate::error::SyncError;
use crate::integration::{Integration, SyncStatus};
use crate::store::{AttemptStore, IntegrationStore};
use chrono::Utc;
use crm_relay_core::{AccountId, IntegrationId, SyncAttemptId};
use crm_relay_provider::{
    ContactIdentifier, ProviderError, ProviderRegistry, ProviderResponse, ProviderType,
};
use crm_relay_transform::{FieldPolicy, StandardContact, StandardEvent};
use crm_relay_vault::{EncryptionKey, decrypt_credentials};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeouts and transformation policy for dispatch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Deadline for a single provider call.
    pub provider_timeout: Duration,
    /// Deadline for the whole fan-out.
    pub request_timeout: Duration,
    /// How unmapped standard fields are treated.
    pub field_policy: FieldPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            field_policy: FieldPolicy::Lenient,
        }
    }
}

/// The outcome of one provider within a fan-out.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    /// The provider this outcome belongs to.
    pub provider: ProviderType,
    /// The integration dispatched against.
    pub integration_id: IntegrationId,
    /// The ledger row, when one was written.
    pub attempt_id: Option<SyncAttemptId>,
    /// Final attempt status.
    pub status: AttemptStatus,
    /// Error message for unsuccessful outcomes.
    pub error: Option<String>,
}

/// Aggregated result of a fan-out, one outcome per provider.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Per-provider outcomes.
    pub outcomes: Vec<ProviderOutcome>,
}

impl SyncReport {
    /// Number of successful outcomes.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == AttemptStatus::Success)
            .count()
    }

    /// Number of unsuccessful outcomes (failed or retrying).
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether every outcome succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Dispatches sync requests to provider adapters and records every attempt
/// in the ledger.
#[derive(Clone)]
pub struct SyncDispatcher {
    registry: Arc<ProviderRegistry>,
    attempts: Arc<dyn AttemptStore>,
    integrations: Arc<dyn IntegrationStore>,
    encryption_key: EncryptionKey,
    backoff: BackoffPolicy,
    config: DispatchConfig,
}

impl SyncDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        attempts: Arc<dyn AttemptStore>,
        integrations: Arc<dyn IntegrationStore>,
        encryption_key: EncryptionKey,
        backoff: BackoffPolicy,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            attempts,
            integrations,
            encryption_key,
            backoff,
            config,
        }
    }

    /// Syncs a contact to all active integrations of the account, or to one
    /// provider when a filter is given.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when the integration list cannot be
    /// loaded and [`SyncError::RequestTimeout`] when the overall deadline
    /// elapses. Per-provider failures are reported in the
    /// [`SyncReport`], not as errors.
    pub async fn sync_contact(
        &self,
        account_id: AccountId,
        contact: &StandardContact,
        provider: Option<ProviderType>,
    ) -> Result<SyncReport, SyncError> {
        let integrations = self.integrations.list_active(account_id, provider).await?;
        if integrations.is_empty() {
            debug!(account_id = %account_id, "no active integrations to sync");
            return Ok(SyncReport::default());
        }
        info!(
            account_id = %account_id,
            integrations = integrations.len(),
            "syncing contact"
        );

        let tasks: Vec<_> = integrations
            .into_iter()
            .map(|integration| {
                let dispatcher = self.clone();
                let contact = contact.clone();
                let provider = integration.provider_type;
                let integration_id = integration.id;
                let handle = tokio::spawn(async move {
                    dispatcher.run_contact_attempt(integration, &contact).await
                });
                (provider, integration_id, handle)
            })
            .collect();

        self.collect_outcomes(tasks).await
    }

    /// Syncs an event to all active integrations of the account, or to one
    /// provider when a filter is given.
    ///
    /// # Errors
    ///
    /// Same contract as [`sync_contact`](Self::sync_contact).
    pub async fn sync_event(
        &self,
        account_id: AccountId,
        event: &StandardEvent,
        identifier: &ContactIdentifier,
        provider: Option<ProviderType>,
    ) -> Result<SyncReport, SyncError> {
        let integrations = self.integrations.list_active(account_id, provider).await?;
        if integrations.is_empty() {
            debug!(account_id = %account_id, "no active integrations to sync");
            return Ok(SyncReport::default());
        }
        info!(
            account_id = %account_id,
            integrations = integrations.len(),
            event = %event.event_name,
            "syncing event"
        );

        let tasks: Vec<_> = integrations
            .into_iter()
            .map(|integration| {
                let dispatcher = self.clone();
                let event = event.clone();
                let identifier = identifier.clone();
                let provider = integration.provider_type;
                let integration_id = integration.id;
                let handle = tokio::spawn(async move {
                    dispatcher
                        .run_event_attempt(integration, &event, &identifier)
                        .await
                });
                (provider, integration_id, handle)
            })
            .collect();

        self.collect_outcomes(tasks).await
    }

    /// Re-dispatches a claimed attempt against its stored request payload.
    ///
    /// The attempt arrives in `pending` state with the retry already
    /// counted; it leaves through the same state machine as a fresh one.
    pub async fn dispatch_attempt(&self, attempt: SyncAttempt) -> ProviderOutcome {
        debug!(
            attempt_id = %attempt.id,
            retry_count = attempt.retry_count,
            "re-dispatching attempt"
        );

        let integration = match self.integrations.find(attempt.integration_id).await {
            Ok(Some(integration)) if integration.is_active => integration,
            Ok(Some(integration)) => {
                let err = SyncError::IntegrationInactive { id: integration.id };
                return self.finish_attempt(attempt, Err(err)).await;
            }
            Ok(None) => {
                let err = SyncError::IntegrationNotFound {
                    id: attempt.integration_id,
                };
                return self.finish_attempt(attempt, Err(err)).await;
            }
            Err(err) => {
                return self.finish_attempt(attempt, Err(SyncError::Store(err))).await;
            }
        };

        let payload = attempt.request_payload.clone();
        let operation = attempt.operation;
        let result = self.perform(&integration, operation, &payload).await;
        self.finish_attempt(attempt, result).await
    }

    async fn collect_outcomes(
        &self,
        tasks: Vec<(
            ProviderType,
            IntegrationId,
            tokio::task::JoinHandle<ProviderOutcome>,
        )>,
    ) -> Result<SyncReport, SyncError> {
        let (metadata, handles): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .map(|(provider, id, handle)| ((provider, id), handle))
            .unzip();

        // Tasks are spawned, so they run to completion and resolve their
        // ledger rows even if this deadline fires first.
        let joined = futures::future::join_all(handles);
        let results = tokio::time::timeout(self.config.request_timeout, joined)
            .await
            .map_err(|_| SyncError::RequestTimeout)?;

        let outcomes = metadata
            .into_iter()
            .zip(results)
            .map(|((provider, integration_id), result)| {
                result.unwrap_or_else(|join_err| ProviderOutcome {
                    provider,
                    integration_id,
                    attempt_id: None,
                    status: AttemptStatus::Failed,
                    error: Some(format!("sync task panicked: {join_err}")),
                })
            })
            .collect();

        Ok(SyncReport { outcomes })
    }

    async fn run_contact_attempt(
        &self,
        integration: Integration,
        contact: &StandardContact,
    ) -> ProviderOutcome {
        let provider = integration.provider_type;
        let entity_id = Some(contact.email.trim().to_lowercase());

        let payload = match crm_relay_transform::transform_contact(
            contact,
            provider,
            self.config.field_policy,
        ) {
            Ok(payload) => payload,
            Err(err) => {
                // Local validation failure: one terminal ledger row, no
                // provider call.
                let fallback = serde_json::to_value(contact).unwrap_or(JsonValue::Null);
                return self
                    .record_rejected(
                        &integration,
                        SyncOperation::CreateOrUpdateContact,
                        "contact",
                        entity_id,
                        fallback,
                        SyncError::Transform(err),
                    )
                    .await;
            }
        };

        self.execute_new_attempt(
            integration,
            SyncOperation::CreateOrUpdateContact,
            "contact",
            entity_id,
            payload,
        )
        .await
    }

    async fn run_event_attempt(
        &self,
        integration: Integration,
        event: &StandardEvent,
        identifier: &ContactIdentifier,
    ) -> ProviderOutcome {
        let provider = integration.provider_type;
        let entity_id = identifier.email.clone().or_else(|| identifier.id.clone());

        let payload =
            match crm_relay_transform::transform_event(event, identifier, provider) {
                Ok(payload) => payload,
                Err(err) => {
                    let fallback = serde_json::to_value(event).unwrap_or(JsonValue::Null);
                    return self
                        .record_rejected(
                            &integration,
                            SyncOperation::SendEvent,
                            "event",
                            entity_id,
                            fallback,
                            SyncError::Transform(err),
                        )
                        .await;
                }
            };

        self.execute_new_attempt(
            integration,
            SyncOperation::SendEvent,
            "event",
            entity_id,
            payload,
        )
        .await
    }

    /// Inserts the pending ledger row, performs the provider call, and
    /// resolves the row.
    async fn execute_new_attempt(
        &self,
        integration: Integration,
        operation: SyncOperation,
        entity_type: &str,
        entity_id: Option<String>,
        payload: JsonValue,
    ) -> ProviderOutcome {
        let attempt = SyncAttempt::pending(
            integration.id,
            integration.account_id,
            integration.provider_type,
            operation,
            entity_type,
            entity_id,
            payload.clone(),
            Utc::now(),
        );

        if let Err(err) = self.attempts.insert(&attempt).await {
            warn!(
                integration_id = %integration.id,
                error = %err,
                "failed to insert ledger row, skipping dispatch"
            );
            return ProviderOutcome {
                provider: integration.provider_type,
                integration_id: integration.id,
                attempt_id: None,
                status: AttemptStatus::Failed,
                error: Some(SyncError::Store(err).to_string()),
            };
        }

        let result = self.perform(&integration, operation, &payload).await;
        self.finish_attempt(attempt, result).await
    }

    /// Records a locally rejected request as a terminal failed attempt.
    async fn record_rejected(
        &self,
        integration: &Integration,
        operation: SyncOperation,
        entity_type: &str,
        entity_id: Option<String>,
        payload: JsonValue,
        error: SyncError,
    ) -> ProviderOutcome {
        let now = Utc::now();
        let mut attempt = SyncAttempt::pending(
            integration.id,
            integration.account_id,
            integration.provider_type,
            operation,
            entity_type,
            entity_id,
            payload,
            now,
        );
        attempt.complete_failure(&error, now, now);

        if let Err(err) = self.attempts.insert(&attempt).await {
            warn!(
                integration_id = %integration.id,
                error = %err,
                "failed to record rejected attempt"
            );
        }
        self.record_integration_outcome(integration.id, &attempt).await;

        ProviderOutcome {
            provider: integration.provider_type,
            integration_id: integration.id,
            attempt_id: Some(attempt.id),
            status: attempt.status,
            error: attempt.error_message,
        }
    }

    /// Runs the provider call with decrypted credentials under the
    /// per-provider timeout. Credentials live only for the duration of the
    /// call.
    async fn perform(
        &self,
        integration: &Integration,
        operation: SyncOperation,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, SyncError> {
        let adapter = self.registry.adapter(integration.provider_type)?;
        let credentials =
            decrypt_credentials(&self.encryption_key, &integration.encrypted_credentials)?;

        let call = async {
            match operation {
                SyncOperation::CreateOrUpdateContact => {
                    adapter.create_or_update_contact(&credentials, payload).await
                }
                SyncOperation::SendEvent => {
                    let identifier = event_identifier(payload)?;
                    adapter.send_event(&credentials, &identifier, payload).await
                }
            }
        };

        match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(result) => result.map_err(SyncError::from),
            // A timed-out call still resolves the attempt; it never stays
            // pending.
            Err(_) => Err(SyncError::Provider(ProviderError::Timeout)),
        }
    }

    /// Resolves an attempt through the state machine and records the
    /// outcome on the integration row.
    async fn finish_attempt(
        &self,
        mut attempt: SyncAttempt,
        result: Result<ProviderResponse, SyncError>,
    ) -> ProviderOutcome {
        let now = Utc::now();
        match result {
            Ok(response) => {
                attempt.complete_success(
                    response.status_code,
                    response.body,
                    response.entity_id,
                    now,
                );
            }
            Err(err) => {
                let next_retry_at = self.backoff.next_retry_at(now, attempt.retry_count);
                attempt.complete_failure(&err, next_retry_at, now);
            }
        }

        if let Err(err) = self.attempts.update(&attempt).await {
            warn!(
                attempt_id = %attempt.id,
                error = %err,
                "failed to update ledger row"
            );
        }
        self.record_integration_outcome(attempt.integration_id, &attempt)
            .await;

        ProviderOutcome {
            provider: attempt.provider_type,
            integration_id: attempt.integration_id,
            attempt_id: Some(attempt.id),
            status: attempt.status,
            error: attempt.error_message,
        }
    }

    async fn record_integration_outcome(&self, id: IntegrationId, attempt: &SyncAttempt) {
        let (status, error) = match attempt.status {
            AttemptStatus::Success => (SyncStatus::Connected, None),
            _ => (SyncStatus::Error, attempt.error_message.clone()),
        };
        if let Err(err) = self
            .integrations
            .record_sync_outcome(id, status, error, Utc::now())
            .await
        {
            warn!(integration_id = %id, error = %err, "failed to record sync outcome");
        }
    }
}

/// Extracts the contact identifier an event envelope carries.
fn event_identifier(payload: &JsonValue) -> Result<ContactIdentifier, ProviderError> {
    let contact = payload
        .get("contact")
        .cloned()
        .ok_or_else(|| ProviderError::InvalidPayload {
            reason: "event payload missing contact identifier".to_string(),
        })?;
    serde_json::from_value(contact).map_err(|e| ProviderError::InvalidPayload {
        reason: format!("malformed contact identifier: {e}"),
    })
}
