//! Field mapping and payload transformation for crm-relay.
//!
//! Callers describe contacts and events once, in the canonical
//! [`StandardContact`]/[`StandardEvent`] schema; this crate turns them into
//! the provider-native shapes each CRM API expects. The mapping tables in
//! [`mappings`] are the single source of truth for every supported provider,
//! including those without a live wire adapter yet.

pub mod contact;
pub mod engine;
pub mod error;
pub mod mappings;

pub use contact::{StandardContact, StandardEvent};
pub use engine::{FieldPolicy, transform_contact, transform_event};
pub use error::TransformError;
pub use mappings::{CustomFieldPlacement, Structure, field_mapping, required_fields, structure};
