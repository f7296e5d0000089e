//! Daemon configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__` as
//! the section separator: `RETRY__BATCH_SIZE=100` sets `retry.batch_size`.
//! Only `DATABASE_URL` and `ENCRYPTION_KEY` are required.

use crm_relay_sync::{BackoffPolicy, DispatchConfig, RetrySchedulerConfig};
use crm_relay_transform::FieldPolicy;
use crm_relay_vault::{CredentialError, EncryptionKey};
use serde::Deserialize;
use std::time::Duration;

/// Daemon configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct SyncdConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Credential encryption key, hex-encoded (64 characters).
    pub encryption_key: String,

    /// Retry sweep configuration.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Dispatch configuration.
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

/// Retry sweep and backoff configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Interval between ledger sweeps, in seconds.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Maximum attempts claimed per sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Base backoff delay for the first retry, in seconds.
    #[serde(default = "default_base_delay_seconds")]
    pub base_delay_seconds: u64,

    /// Backoff ceiling, in seconds.
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: u64,

    /// Maximum random jitter added to each delay, in seconds.
    #[serde(default = "default_jitter_seconds")]
    pub jitter_seconds: u64,
}

/// Dispatch timeout and field-policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    /// Deadline for a single provider call, in seconds.
    #[serde(default = "default_provider_timeout_seconds")]
    pub provider_timeout_seconds: u64,

    /// Deadline for a whole fan-out, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// When true, unmapped standard fields fail the sync instead of being
    /// dropped with a warning.
    #[serde(default)]
    pub strict_fields: bool,
}

fn default_sweep_interval_seconds() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    50
}

fn default_base_delay_seconds() -> u64 {
    30
}

fn default_max_delay_seconds() -> u64 {
    3600
}

fn default_jitter_seconds() -> u64 {
    5
}

fn default_provider_timeout_seconds() -> u64 {
    30
}

fn default_request_timeout_seconds() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval_seconds(),
            batch_size: default_batch_size(),
            base_delay_seconds: default_base_delay_seconds(),
            max_delay_seconds: default_max_delay_seconds(),
            jitter_seconds: default_jitter_seconds(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            provider_timeout_seconds: default_provider_timeout_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            strict_fields: false,
        }
    }
}

impl SyncdConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Decodes the hex-encoded encryption key.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidKey`] when the value is not 64 hex
    /// characters.
    pub fn encryption_key(&self) -> Result<EncryptionKey, CredentialError> {
        EncryptionKey::from_hex(&self.encryption_key)
    }

    /// The backoff policy the retry section describes.
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_secs(self.retry.base_delay_seconds),
            max_delay: Duration::from_secs(self.retry.max_delay_seconds),
            jitter: Duration::from_secs(self.retry.jitter_seconds),
        }
    }

    /// The scheduler configuration the retry section describes.
    #[must_use]
    pub fn scheduler_config(&self) -> RetrySchedulerConfig {
        RetrySchedulerConfig {
            sweep_interval: Duration::from_secs(self.retry.sweep_interval_seconds),
            batch_size: self.retry.batch_size,
        }
    }

    /// The dispatch configuration the dispatch section describes.
    #[must_use]
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            provider_timeout: Duration::from_secs(self.dispatch.provider_timeout_seconds),
            request_timeout: Duration::from_secs(self.dispatch.request_timeout_seconds),
            field_policy: if self.dispatch.strict_fields {
                FieldPolicy::Strict
            } else {
                FieldPolicy::Lenient
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_has_correct_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.sweep_interval_seconds, 30);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.base_delay_seconds, 30);
        assert_eq!(config.max_delay_seconds, 3600);
    }

    #[test]
    fn dispatch_settings_default_to_lenient() {
        let config = SyncdConfig {
            database_url: "postgres://localhost/crm_relay".to_string(),
            encryption_key: "00".repeat(32),
            retry: RetryConfig::default(),
            dispatch: DispatchSettings::default(),
        };
        assert_eq!(config.dispatch_config().field_policy, FieldPolicy::Lenient);
        assert!(config.encryption_key().is_ok());
    }

    #[test]
    fn bad_encryption_key_is_rejected() {
        let config = SyncdConfig {
            database_url: "postgres://localhost/crm_relay".to_string(),
            encryption_key: "not-hex".to_string(),
            retry: RetryConfig::default(),
            dispatch: DispatchSettings::default(),
        };
        assert!(config.encryption_key().is_err());
    }
}
