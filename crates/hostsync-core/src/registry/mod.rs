//! Plugin-based adapter registry
//!
//! The registry allows providers and targets to be registered dynamically at
//! runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hostsync_core::registry::AdapterRegistry;
//! use hostsync_core::config::TargetConfig;
//! use hostsync_core::AnyMeta;
//!
//! let registry: AdapterRegistry<AnyMeta> = AdapterRegistry::new();
//!
//! // Adapter crates register their factories
//! hostsync_target_cloudflare::register(&registry, false);
//!
//! // Create a target from config
//! let config = TargetConfig::CloudflareDns { ... };
//! let target = registry.create_target(&config)?;
//! ```
//!
//! ## Registration
//!
//! Adapters register themselves under the name their config's `type_name()`
//! returns:
//!
//! ```rust,ignore
//! // In hostsync-provider-traefik
//! pub fn register<M: TargetMeta>(registry: &AdapterRegistry<M>) {
//!     registry.register_provider("traefik", Box::new(TraefikFactory));
//! }
//! ```
//!
//! The registry is generic over the target metadata type `M`: every target in
//! one registry shares it, since one [`Operations`](crate::operations::Operations)
//! instance drives them all. Targets with different metadata types go into an
//! `AdapterRegistry<AnyMeta>` through [`ErasedFactory`](crate::traits::ErasedFactory).

use crate::config::{ProviderConfig, TargetConfig};
use crate::error::{Error, Result};
use crate::traits::{Provider, ProviderFactory, Target, TargetFactory, TargetMeta};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Adapter registry for plugin-based provider and target creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
pub struct AdapterRegistry<M: TargetMeta = ()> {
    /// Registered provider factories
    providers: RwLock<HashMap<String, Box<dyn ProviderFactory>>>,

    /// Registered target factories
    targets: RwLock<HashMap<String, Box<dyn TargetFactory<M>>>>,
}

impl<M: TargetMeta> AdapterRegistry<M> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            targets: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "traefik", "docker")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn ProviderFactory>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), factory);
    }

    /// Register a target factory
    ///
    /// # Parameters
    ///
    /// - `name`: Target type name (e.g., "cloudflare-dns")
    /// - `factory`: Factory object for creating target instances
    pub fn register_target(&self, name: impl Into<String>, factory: Box<dyn TargetFactory<M>>) {
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        targets.insert(name.into(), factory);
    }

    /// Create a provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn Provider>)`: Created provider instance
    /// - `Err(Error)`: If the provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create a target from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn Target>)`: Created target instance
    /// - `Err(Error)`: If the target type is not registered or creation fails
    pub fn create_target(&self, config: &TargetConfig) -> Result<Arc<dyn Target<Meta = M>>> {
        let target_type = config.type_name();
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);

        let factory = targets
            .get(target_type)
            .ok_or_else(|| Error::config(format!("Unknown target type: {}", target_type)))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered target types
    pub fn list_targets(&self) -> Vec<String> {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        targets.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if a target type is registered
    pub fn has_target(&self, name: &str) -> bool {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        targets.contains_key(name)
    }
}

impl<M: TargetMeta> Default for AdapterRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProviderFactory;

    impl ProviderFactory for MockProviderFactory {
        fn create(&self, _config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
            Err(Error::not_found("Mock provider not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry: AdapterRegistry = AdapterRegistry::new();

        assert!(!registry.has_provider("mock"));

        registry.register_provider("mock", Box::new(MockProviderFactory));

        assert!(registry.has_provider("mock"));
        assert!(registry.list_providers().contains(&"mock".to_string()));
        assert!(!registry.has_target("mock"));
    }

    #[test]
    fn test_unknown_target_type() {
        let registry: AdapterRegistry = AdapterRegistry::new();
        let config = TargetConfig::CloudflareDns {
            api_token: "t".to_string(),
            zone_id: "z".to_string(),
            tunnel_id: "x".to_string(),
        };

        match registry.create_target(&config) {
            Err(Error::Config(message)) => assert!(message.contains("cloudflare-dns")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("target created without a registered factory"),
        }
    }
}
