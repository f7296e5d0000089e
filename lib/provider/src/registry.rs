//! Provider registry: maps provider types to adapter instances.

use crate::adapter::CrmAdapter;
use crate::creatio::CreatioAdapter;
use crate::error::ProviderError;
use crate::klaviyo::KlaviyoAdapter;
use crate::salesforce::SalesforceAdapter;
use crate::types::ProviderType;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available CRM adapters.
///
/// Lookup by [`ProviderType`]; provider types without a registered adapter
/// resolve to [`ProviderError::UnsupportedProvider`].
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderType, Arc<dyn CrmAdapter>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with all built-in adapters registered.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(KlaviyoAdapter::new()));
        registry.register(Arc::new(SalesforceAdapter::new()));
        registry.register(Arc::new(CreatioAdapter::new()));
        registry
    }

    /// Registers an adapter, replacing any previous adapter for the same
    /// provider type.
    pub fn register(&mut self, adapter: Arc<dyn CrmAdapter>) {
        self.adapters.insert(adapter.provider_type(), adapter);
    }

    /// Resolves the adapter for a provider type.
    pub fn adapter(&self, provider: ProviderType) -> Result<Arc<dyn CrmAdapter>, ProviderError> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or(ProviderError::UnsupportedProvider { provider })
    }

    /// Whether an adapter is registered for the provider type.
    #[must_use]
    pub fn supports(&self, provider: ProviderType) -> bool {
        self.adapters.contains_key(&provider)
    }

    /// Provider types with a registered adapter.
    #[must_use]
    pub fn registered_types(&self) -> Vec<ProviderType> {
        let mut types: Vec<_> = self.adapters.keys().copied().collect();
        types.sort_by_key(ProviderType::as_str);
        types
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("registered", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_contents() {
        let registry = ProviderRegistry::with_builtin();
        assert!(registry.supports(ProviderType::Klaviyo));
        assert!(registry.supports(ProviderType::Salesforce));
        assert!(registry.supports(ProviderType::Creatio));
        assert!(!registry.supports(ProviderType::Hubspot));
        assert_eq!(registry.registered_types().len(), 3);
    }

    #[test]
    fn unregistered_provider_is_unsupported() {
        let registry = ProviderRegistry::with_builtin();
        let result = registry.adapter(ProviderType::Mailchimp);
        assert!(matches!(
            result,
            Err(ProviderError::UnsupportedProvider {
                provider: ProviderType::Mailchimp
            })
        ));
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(KlaviyoAdapter::new()));
        registry.register(Arc::new(KlaviyoAdapter::with_base_url(
            "http://localhost:9",
        )));
        assert_eq!(registry.registered_types(), vec![ProviderType::Klaviyo]);
    }

    #[test]
    fn adapter_lookup_returns_matching_type() {
        let registry = ProviderRegistry::with_builtin();
        let adapter = registry.adapter(ProviderType::Creatio).expect("registered");
        assert_eq!(adapter.provider_type(), ProviderType::Creatio);
    }
}
