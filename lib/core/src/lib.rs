//! Core domain types and utilities for the crm-relay platform.
//!
//! This crate provides the foundational types, error handling, and shared
//! utilities used throughout the crm-relay CRM synchronization service.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AccountId, IntegrationId, SyncAttemptId};
