//! Settings structures for codesearch-rs configuration

use crate::engines::BackendType;
use crate::error::{Result, SearchError};
use crate::search::SortOrder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Name that expands to every configured backend
pub const ALL_BACKENDS: &str = "all";

/// Main settings structure, loaded from `config.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backends searched when none are requested explicitly
    pub default_backends: Vec<String>,
    pub search: SearchSettings,
    pub outgoing: OutgoingSettings,
    /// Configured backends by unique name
    pub backends: BTreeMap<String, BackendConfig>,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| SearchError::filesystem(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| SearchError::Config(format!("invalid settings: {}", e)))
    }

    /// Merge with environment variables (CODESEARCH_* prefix)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("CODESEARCH_DEFAULT_BACKENDS") {
            self.default_backends = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(val) = std::env::var("CODESEARCH_REQUEST_TIMEOUT") {
            if let Ok(timeout) = val.parse() {
                self.outgoing.request_timeout = timeout;
            }
        }
    }

    /// Check cross-references between default backends and configured ones
    pub fn validate(&self) -> Result<()> {
        for name in &self.default_backends {
            if name == ALL_BACKENDS {
                if self.default_backends.len() > 1 {
                    return Err(SearchError::Config(
                        "default_backends: all backends requested, but other backends are specified too"
                            .to_string(),
                    ));
                }
            } else if !self.backends.contains_key(name) {
                return Err(SearchError::Config(format!(
                    "default_backends: unknown backend {:?}",
                    name
                )));
            }
        }

        for (name, backend) in &self.backends {
            if name == ALL_BACKENDS {
                return Err(SearchError::Config(format!(
                    "backend name '{}' is reserved",
                    ALL_BACKENDS
                )));
            }
            backend.backend_type.parse::<BackendType>()?;
        }

        Ok(())
    }

    /// Get backend config by name
    pub fn get_backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }

    /// Resolve requested backend names. An empty request falls back to
    /// `default_backends`, and `all` expands to every enabled backend.
    pub fn resolve_backends(&self, requested: &[String]) -> Result<Vec<String>> {
        let wanted = if requested.is_empty() {
            &self.default_backends
        } else {
            requested
        };

        if wanted.iter().any(|name| name == ALL_BACKENDS) {
            return Ok(self
                .backends
                .iter()
                .filter(|(_, config)| !config.disabled)
                .map(|(name, _)| name.clone())
                .collect());
        }

        let mut names = Vec::with_capacity(wanted.len());
        for name in wanted {
            if !self.backends.contains_key(name) {
                return Err(SearchError::Config(format!("backend {:?} not found", name)));
            }
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Ok(names)
    }
}

/// Default search options, overridable per invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub lines_before: usize,
    pub lines_after: usize,
    pub case_insensitive: bool,
}

/// Outgoing request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Request timeout in seconds
    pub request_timeout: f64,
    /// User agent string (none = crate default)
    pub useragent: Option<String>,
    /// Pool max size
    pub pool_maxsize: usize,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Proxy settings
    pub proxies: ProxySettings,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 30.0,
            useragent: None,
            pool_maxsize: 10,
            verify_ssl: true,
            proxies: ProxySettings::default(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Individual backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend type tag (github, gitlab, csearch)
    #[serde(rename = "type")]
    pub backend_type: String,
    /// Ordering applied to this backend's results
    pub sort: SortOrder,
    /// Maximum number of results kept, 0 = unlimited
    pub max_results: usize,
    /// Whether `all` skips this backend
    pub disabled: bool,
    /// Type-specific parameters (credentials, endpoint, scope, index file)
    pub params: BackendParams,
}

/// Opaque per-backend parameter map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendParams(HashMap<String, serde_yaml::Value>);

impl BackendParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a string parameter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0
            .insert(key.into(), serde_yaml::Value::String(value.into()));
        self
    }

    /// Optional string parameter. Present but not a string is an error.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None | Some(serde_yaml::Value::Null) => Ok(None),
            Some(serde_yaml::Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(SearchError::Config(format!(
                "invalid '{}' parameter: expected a string",
                key
            ))),
        }
    }

    /// Required string parameter
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)?
            .ok_or_else(|| SearchError::Config(format!("missing '{}' parameter", key)))
    }
}
