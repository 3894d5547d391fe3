//! Provider registry -- a named collection of available tracker adapters.
//!
//! The registry lets the CLI look up a provider by its configured target
//! name at runtime (e.g. `target = "memory"`).

use std::collections::HashMap;
use std::sync::Arc;

use super::trait_def::Provider;

/// A collection of registered [`Provider`] implementations, keyed by name.
///
/// Providers are stored as `Arc<dyn Provider>` because the sync engine
/// shares the provider across concurrently spawned operations.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider adapter under the name returned by
    /// [`Provider::name`]. An already-registered provider with the same
    /// name is replaced and returned.
    pub fn register(&mut self, provider: impl Provider + 'static) -> Option<Arc<dyn Provider>> {
        let name = provider.name().to_owned();
        self.providers.insert(name, Arc::new(provider))
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List the names of all registered providers, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list())
            .finish()
    }
}
