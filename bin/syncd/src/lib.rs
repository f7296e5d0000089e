//! The crm-relay sync daemon.
//!
//! Wires the provider adapters, the PostgreSQL-backed ledger and the retry
//! scheduler together, and exposes the integration registry callers use to
//! connect and disconnect CRM providers.

pub mod config;
pub mod db;
pub mod registry;

pub use config::SyncdConfig;
pub use db::{IntegrationRepository, SyncAttemptRepository};
pub use registry::{IntegrationRegistry, IntegrationStatusView, RegistryError};
