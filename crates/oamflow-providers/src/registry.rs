//! Provider registry

use crate::error::{ProviderError, Result};
use crate::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry mapping step types to their handlers
#[derive(Default)]
pub struct Providers {
    handlers: HashMap<String, Arc<dyn Provider>>,
}

impl Providers {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in providers installed
    pub fn with_builtins() -> Self {
        let mut providers = Self::new();
        crate::builtin::install(&mut providers);
        providers
    }

    /// Register a provider under its step type
    pub fn register<P: Provider + 'static>(&mut self, provider: P) {
        let name = provider.name().to_string();
        self.handlers.insert(name, Arc::new(provider));
    }

    /// Register a provider (Arc version for shared ownership)
    pub fn register_arc(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        self.handlers.insert(name, provider);
    }

    /// Look up a provider by step type
    pub fn get(&self, step_type: &str) -> Result<Arc<dyn Provider>> {
        self.handlers
            .get(step_type)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(step_type.to_string()))
    }

    /// Whether a step type has a handler
    pub fn has_provider(&self, step_type: &str) -> bool {
        self.handlers.contains_key(step_type)
    }

    /// All registered step types
    pub fn provider_names(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
