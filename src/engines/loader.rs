//! Backend loader for constructing backends from configuration

use super::registry::BackendRegistry;
use super::traits::{Backend, BackendType};
use super::{csearch, github, gitlab};
use crate::config::{BackendConfig, Settings};
use crate::error::{Result, SearchError};
use crate::network::HttpClient;
use std::sync::Arc;
use tracing::info;

/// Constructs backends by type tag
pub struct BackendLoader;

impl BackendLoader {
    /// Build the named backends into a registry, in the given order. Any
    /// unknown name or invalid configuration fails the whole load.
    pub fn load(settings: &Settings, names: &[String], client: &HttpClient) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();

        for name in names {
            let config = settings
                .get_backend(name)
                .ok_or_else(|| SearchError::Config(format!("backend {:?} not found", name)))?;
            let backend = Self::create(name, config, client)?;
            info!("Loaded backend: {} ({})", name, backend.backend_type());
            registry.register(backend, config.clone());
        }

        Ok(registry)
    }

    /// Create a backend instance from its configuration
    pub fn create(name: &str, config: &BackendConfig, client: &HttpClient) -> Result<Arc<dyn Backend>> {
        let backend_type: BackendType = config.backend_type.parse()?;
        let backend: Arc<dyn Backend> = match backend_type {
            BackendType::Github => Arc::new(github::Github::from_params(
                name,
                &config.params,
                client.clone(),
            )?),
            BackendType::Gitlab => Arc::new(gitlab::Gitlab::from_params(
                name,
                &config.params,
                client.clone(),
            )?),
            BackendType::Csearch => Arc::new(csearch::Csearch::from_params(name, &config.params)?),
        };
        Ok(backend)
    }
}
