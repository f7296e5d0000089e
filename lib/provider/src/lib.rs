//! CRM provider adapters for the crm-relay platform.
//!
//! Each supported CRM is driven through the [`CrmAdapter`] trait, providing a
//! uniform interface for credential validation, contact upserts, event
//! delivery and contact lookup. The [`ProviderRegistry`] maps provider types
//! to adapter instances; providers without a wire adapter yet are still part
//! of the [`ProviderType`] vocabulary so the rest of the platform (field
//! mapping, persistence) can reference them.

pub mod adapter;
pub mod creatio;
pub mod error;
pub mod klaviyo;
pub mod registry;
pub mod salesforce;
pub mod types;

pub use adapter::CrmAdapter;
pub use creatio::CreatioAdapter;
pub use error::ProviderError;
pub use klaviyo::KlaviyoAdapter;
pub use registry::ProviderRegistry;
pub use salesforce::SalesforceAdapter;
pub use types::{ContactIdentifier, ProviderResponse, ProviderType};
