//! Search query and per-backend result policy

use crate::config::BackendConfig;
use crate::engines::SearchOptions;
use crate::results::SearchResult;
use serde::{Deserialize, Serialize};

/// Ordering applied to one backend's results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// By path, A to Z
    #[serde(alias = "asc")]
    Ascending,
    /// By path, Z to A
    #[serde(alias = "desc")]
    Descending,
    /// As returned by the backend
    #[default]
    #[serde(alias = "none")]
    Unmodified,
}

/// Sort order and cap for one backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendPolicy {
    pub sort: SortOrder,
    /// 0 = unlimited
    pub max_results: usize,
}

impl BackendPolicy {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            sort: config.sort,
            max_results: config.max_results,
        }
    }

    /// Sort (stable, by path) then truncate to the cap
    pub fn apply(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        match self.sort {
            SortOrder::Ascending => results.sort_by(|a, b| a.path.cmp(&b.path)),
            SortOrder::Descending => results.sort_by(|a, b| b.path.cmp(&a.path)),
            SortOrder::Unmodified => {}
        }
        if self.max_results > 0 {
            results.truncate(self.max_results);
        }
        results
    }
}

/// Complete search request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The search query string
    pub query: String,
    /// Backends to search, in order
    pub backends: Vec<String>,
    /// Options applied to every backend, masked per capability
    #[serde(default)]
    pub options: SearchOptions,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, backends: Vec<String>) -> Self {
        Self {
            query: query.into(),
            backends,
            options: SearchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }
}
