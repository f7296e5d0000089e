//! The sync attempt: one ledger row per provider call.
//!
//! Every dispatch, successful or not, produces exactly one attempt row.
//! The status field moves through a small state machine:
//!
//! ```text
//! pending -> success                      (terminal)
//! pending -> failed                       (terminal, or -> retrying)
//! failed  -> retrying                     (retryable error, retries left)
//! retrying -> pending                     (claimed by the sweep, count +1)
//! ```
//!
//! `retry_count` increments at claim time, never at failure time, so the
//! count always reflects dispatches actually performed.

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use crm_relay_core::{AccountId, IntegrationId, SyncAttemptId};
use crm_relay_provider::ProviderType;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Default maximum number of retries per attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Status of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Dispatched but not yet resolved.
    Pending,
    /// The provider call succeeded.
    Success,
    /// The attempt failed terminally.
    Failed,
    /// The attempt failed retryably and waits for the sweep.
    Retrying,
}

impl AttemptStatus {
    /// Returns the canonical string name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    /// Whether this status ends the attempt's lifecycle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation an attempt performs against the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    CreateOrUpdateContact,
    SendEvent,
}

impl SyncOperation {
    /// Returns the canonical string name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateOrUpdateContact => "create_or_update_contact",
            Self::SendEvent => "send_event",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row in the sync audit ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAttempt {
    /// Attempt id.
    pub id: SyncAttemptId,
    /// The integration this attempt ran against.
    pub integration_id: IntegrationId,
    /// The owning account.
    pub account_id: AccountId,
    /// Target provider.
    pub provider_type: ProviderType,
    /// Operation performed.
    pub operation: SyncOperation,
    /// Entity kind, e.g. `contact` or `event`.
    pub entity_type: String,
    /// Caller-side entity identifier (email, event name, ...).
    pub entity_id: Option<String>,
    /// The provider-native payload sent; re-dispatches reuse it verbatim.
    pub request_payload: JsonValue,
    /// The provider response body, when a response was received.
    pub response_payload: Option<JsonValue>,
    /// Provider-side entity id, when the response carried one.
    pub provider_entity_id: Option<String>,
    /// Attempt status.
    pub status: AttemptStatus,
    /// Provider HTTP status code, when one was received.
    pub status_code: Option<u16>,
    /// Error message for failed/retrying attempts.
    pub error_message: Option<String>,
    /// Dispatches performed so far beyond the first.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// When the sweep may re-dispatch a retrying attempt.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When the attempt was dispatched.
    pub started_at: DateTime<Utc>,
    /// When the attempt resolved.
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at` in milliseconds; tracks the timestamps.
    pub duration_ms: Option<i64>,
}

impl SyncAttempt {
    /// Creates a pending attempt, dispatched now.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        integration_id: IntegrationId,
        account_id: AccountId,
        provider_type: ProviderType,
        operation: SyncOperation,
        entity_type: impl Into<String>,
        entity_id: Option<String>,
        request_payload: JsonValue,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SyncAttemptId::new(),
            integration_id,
            account_id,
            provider_type,
            operation,
            entity_type: entity_type.into(),
            entity_id,
            request_payload,
            response_payload: None,
            provider_entity_id: None,
            status: AttemptStatus::Pending,
            status_code: None,
            error_message: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            next_retry_at: None,
            started_at: now,
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Whether the retry budget allows another dispatch.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Resolves the attempt as successful.
    pub fn complete_success(
        &mut self,
        status_code: u16,
        response_payload: JsonValue,
        provider_entity_id: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = AttemptStatus::Success;
        self.status_code = Some(status_code);
        self.response_payload = Some(response_payload);
        self.provider_entity_id = provider_entity_id;
        self.error_message = None;
        self.next_retry_at = None;
        self.set_completed(now);
    }

    /// Resolves the attempt as failed.
    ///
    /// A retryable error with retries left moves the attempt to `retrying`
    /// with the supplied `next_retry_at`; otherwise it is terminally
    /// `failed`.
    pub fn complete_failure(
        &mut self,
        error: &SyncError,
        next_retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        if error.is_retryable() && self.can_retry() {
            self.status = AttemptStatus::Retrying;
            self.next_retry_at = Some(next_retry_at);
        } else {
            self.status = AttemptStatus::Failed;
            self.next_retry_at = None;
        }
        self.status_code = error.status_code();
        self.error_message = Some(error.to_string());
        self.set_completed(now);
    }

    /// Re-arms a claimed attempt for dispatch: back to `pending` with the
    /// retry counted and the completion cleared.
    pub fn mark_claimed(&mut self, now: DateTime<Utc>) {
        self.status = AttemptStatus::Pending;
        self.retry_count += 1;
        self.next_retry_at = None;
        self.completed_at = None;
        self.duration_ms = None;
        self.started_at = now;
    }

    fn set_completed(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
    }
}
