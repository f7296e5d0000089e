//! Background sweep that re-dispatches retrying attempts.
//!
//! The sweep claims due attempts through [`AttemptStore::claim_due`], which
//! counts the retry atomically, then hands each claimed attempt back to the
//! dispatcher. Multiple daemon instances can sweep the same ledger safely.

use crate::dispatcher::SyncDispatcher;
use crate::store::AttemptStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sweep cadence and batch sizing.
#[derive(Debug, Clone, Copy)]
pub struct RetrySchedulerConfig {
    /// How often the ledger is swept for due attempts.
    pub sweep_interval: Duration,
    /// Maximum attempts claimed per sweep.
    pub batch_size: u32,
}

impl Default for RetrySchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            batch_size: 50,
        }
    }
}

/// Periodically claims due retrying attempts and re-dispatches them.
pub struct RetryScheduler {
    attempts: Arc<dyn AttemptStore>,
    dispatcher: SyncDispatcher,
    config: RetrySchedulerConfig,
}

impl RetryScheduler {
    /// Creates a scheduler over the given ledger and dispatcher.
    #[must_use]
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        dispatcher: SyncDispatcher,
        config: RetrySchedulerConfig,
    ) -> Self {
        Self {
            attempts,
            dispatcher,
            config,
        }
    }

    /// Spawns the sweep loop and returns a handle for shutdown.
    #[must_use]
    pub fn start(self) -> RetrySchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(
                sweep_interval_secs = self.config.sweep_interval.as_secs(),
                batch_size = self.config.batch_size,
                "retry scheduler started"
            );
            let mut interval = tokio::time::interval(self.config.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => self.sweep().await,
                    _ = shutdown_rx.changed() => {
                        info!("retry scheduler stopping");
                        break;
                    }
                }
            }
        });
        RetrySchedulerHandle { shutdown_tx, task }
    }

    /// Claims and re-dispatches one batch of due attempts.
    pub async fn sweep(&self) {
        let claimed = match self
            .attempts
            .claim_due(Utc::now(), self.config.batch_size)
            .await
        {
            Ok(claimed) => claimed,
            Err(err) => {
                warn!(error = %err, "retry sweep failed to claim attempts");
                return;
            }
        };
        if claimed.is_empty() {
            return;
        }
        debug!(claimed = claimed.len(), "re-dispatching claimed attempts");

        let redispatches = claimed
            .into_iter()
            .map(|attempt| self.dispatcher.dispatch_attempt(attempt));
        futures::future::join_all(redispatches).await;
    }
}

/// Handle to a running scheduler.
pub struct RetrySchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RetrySchedulerHandle {
    /// Signals the sweep loop to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::{AttemptStatus, SyncAttempt, SyncOperation};
    use crate::backoff::BackoffPolicy;
    use crate::dispatcher::DispatchConfig;
    use crate::error::SyncError;
    use crate::testing::{
        InMemoryAttemptStore, InMemoryIntegrationStore, MockAdapter, test_integration,
    };
    use crm_relay_core::AccountId;
    use crm_relay_provider::{ProviderError, ProviderRegistry, ProviderType};
    use crm_relay_vault::EncryptionKey;
    use serde_json::json;

    fn retrying_attempt(integration: &crate::integration::Integration) -> SyncAttempt {
        let mut attempt = SyncAttempt::pending(
            integration.id,
            integration.account_id,
            integration.provider_type,
            SyncOperation::CreateOrUpdateContact,
            "contact",
            Some("a@b.co".to_string()),
            json!({"attributes": {"email": "a@b.co"}}),
            Utc::now(),
        );
        let err = SyncError::Provider(ProviderError::Timeout);
        attempt.complete_failure(&err, Utc::now() - chrono::Duration::seconds(1), Utc::now());
        assert_eq!(attempt.status, AttemptStatus::Retrying);
        attempt
    }

    fn scheduler_over(
        attempts: Arc<InMemoryAttemptStore>,
        integrations: Arc<InMemoryIntegrationStore>,
        registry: ProviderRegistry,
        key: EncryptionKey,
        config: RetrySchedulerConfig,
    ) -> RetryScheduler {
        let dispatcher = SyncDispatcher::new(
            Arc::new(registry),
            Arc::clone(&attempts) as Arc<dyn AttemptStore>,
            integrations,
            key,
            BackoffPolicy::default(),
            DispatchConfig::default(),
        );
        RetryScheduler::new(attempts, dispatcher, config)
    }

    #[tokio::test]
    async fn sweep_redispatches_due_attempts() {
        let key = EncryptionKey::generate();
        let attempts = Arc::new(InMemoryAttemptStore::new());
        let integrations = Arc::new(InMemoryIntegrationStore::new());

        let integration = test_integration(
            AccountId::new(),
            ProviderType::Klaviyo,
            &key,
            &json!({"api_key": "pk"}),
        );
        attempts
            .insert(&retrying_attempt(&integration))
            .await
            .expect("insert");
        integrations.put(integration);

        let adapter = Arc::new(MockAdapter::succeeding(ProviderType::Klaviyo));
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::clone(&adapter) as Arc<dyn crm_relay_provider::CrmAdapter>);

        let scheduler = scheduler_over(
            Arc::clone(&attempts),
            integrations,
            registry,
            key,
            RetrySchedulerConfig::default(),
        );
        scheduler.sweep().await;

        assert_eq!(adapter.calls(), 1);
        let rows = attempts.all();
        assert_eq!(rows[0].status, AttemptStatus::Success);
        assert_eq!(rows[0].retry_count, 1);
    }

    #[tokio::test]
    async fn sweep_skips_attempts_not_yet_due() {
        let key = EncryptionKey::generate();
        let attempts = Arc::new(InMemoryAttemptStore::new());
        let integrations = Arc::new(InMemoryIntegrationStore::new());

        let integration = test_integration(
            AccountId::new(),
            ProviderType::Klaviyo,
            &key,
            &json!({"api_key": "pk"}),
        );
        let mut attempt = retrying_attempt(&integration);
        attempt.next_retry_at = Some(Utc::now() + chrono::Duration::hours(1));
        attempts.insert(&attempt).await.expect("insert");
        integrations.put(integration);

        let adapter = Arc::new(MockAdapter::succeeding(ProviderType::Klaviyo));
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::clone(&adapter) as Arc<dyn crm_relay_provider::CrmAdapter>);

        let scheduler = scheduler_over(
            Arc::clone(&attempts),
            integrations,
            registry,
            key,
            RetrySchedulerConfig::default(),
        );
        scheduler.sweep().await;

        assert_eq!(adapter.calls(), 0);
        assert_eq!(attempts.all()[0].status, AttemptStatus::Retrying);
    }

    #[tokio::test]
    async fn sweep_respects_batch_size() {
        let key = EncryptionKey::generate();
        let attempts = Arc::new(InMemoryAttemptStore::new());
        let integrations = Arc::new(InMemoryIntegrationStore::new());

        let integration = test_integration(
            AccountId::new(),
            ProviderType::Klaviyo,
            &key,
            &json!({"api_key": "pk"}),
        );
        for _ in 0..3 {
            attempts
                .insert(&retrying_attempt(&integration))
                .await
                .expect("insert");
        }
        integrations.put(integration);

        let adapter = Arc::new(MockAdapter::succeeding(ProviderType::Klaviyo));
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::clone(&adapter) as Arc<dyn crm_relay_provider::CrmAdapter>);

        let scheduler = scheduler_over(
            Arc::clone(&attempts),
            integrations,
            registry,
            key,
            RetrySchedulerConfig {
                batch_size: 2,
                ..RetrySchedulerConfig::default()
            },
        );
        scheduler.sweep().await;

        assert_eq!(adapter.calls(), 2);
        let still_retrying = attempts
            .all()
            .iter()
            .filter(|a| a.status == AttemptStatus::Retrying)
            .count();
        assert_eq!(still_retrying, 1);
    }

    #[tokio::test]
    async fn concurrent_sweeps_claim_each_attempt_once() {
        let key = EncryptionKey::generate();
        let attempts = Arc::new(InMemoryAttemptStore::new());

        let integration = test_integration(
            AccountId::new(),
            ProviderType::Klaviyo,
            &key,
            &json!({"api_key": "pk"}),
        );
        attempts
            .insert(&retrying_attempt(&integration))
            .await
            .expect("insert");

        let now = Utc::now();
        let (first, second) = tokio::join!(
            attempts.claim_due(now, 10),
            attempts.claim_due(now, 10)
        );
        let claimed = first.expect("claim").len() + second.expect("claim").len();
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn started_scheduler_shuts_down_cleanly() {
        let key = EncryptionKey::generate();
        let attempts = Arc::new(InMemoryAttemptStore::new());
        let integrations = Arc::new(InMemoryIntegrationStore::new());

        let scheduler = scheduler_over(
            Arc::clone(&attempts),
            integrations,
            ProviderRegistry::new(),
            key,
            RetrySchedulerConfig {
                sweep_interval: Duration::from_millis(10),
                batch_size: 10,
            },
        );
        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;
    }
}
