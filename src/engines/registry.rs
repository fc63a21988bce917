//! Backend registry for the configured search sources

use super::traits::Backend;
use crate::config::BackendConfig;
use crate::search::BackendPolicy;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of constructed backends and their configurations
pub struct BackendRegistry {
    /// Backends by name
    backends: HashMap<String, Arc<dyn Backend>>,
    /// Backend configurations
    configs: HashMap<String, BackendConfig>,
    /// Names in registration order
    order: Vec<String>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            configs: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a backend. Registering a name again replaces the previous
    /// backend but keeps its position.
    pub fn register(&mut self, backend: Arc<dyn Backend>, config: BackendConfig) {
        let name = backend.name().to_string();
        if !self.backends.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.backends.insert(name.clone(), backend);
        self.configs.insert(name, config);
    }

    /// Get a backend by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(name)
    }

    /// Sort order and cap applied to a backend's results
    pub fn get_policy(&self, name: &str) -> BackendPolicy {
        self.configs
            .get(name)
            .map(BackendPolicy::from_config)
            .unwrap_or_default()
    }

    /// All backend names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
