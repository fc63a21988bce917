//! Backend traits and types

use crate::error::{Result, SearchError};
use crate::results::SearchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Known backend type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Hosted code search with fragment-relative matches
    Github,
    /// Hosted repository blob search
    Gitlab,
    /// Local trigram index
    Csearch,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Csearch => "csearch",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            "csearch" => Ok(Self::Csearch),
            other => Err(SearchError::Config(format!(
                "unknown backend type {:?}",
                other
            ))),
        }
    }
}

/// Options applied to a single search call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Context lines before each match
    pub lines_before: usize,
    /// Context lines after each match
    pub lines_after: usize,
    /// Match regardless of case
    pub case_insensitive: bool,
    /// Match file names instead of file content
    pub filenames_only: bool,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines_before(mut self, n: usize) -> Self {
        self.lines_before = n;
        self
    }

    pub fn with_lines_after(mut self, n: usize) -> Self {
        self.lines_after = n;
        self
    }

    /// Same radius on both sides
    pub fn with_context(self, n: usize) -> Self {
        self.with_lines_before(n).with_lines_after(n)
    }

    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }

    pub fn filenames_only(mut self, yes: bool) -> Self {
        self.filenames_only = yes;
        self
    }

    pub fn wants_context(&self) -> bool {
        self.lines_before > 0 || self.lines_after > 0
    }
}

/// Main backend trait that every search source implements
#[async_trait]
pub trait Backend: Send + Sync {
    /// Configured backend name
    fn name(&self) -> &str;

    /// Backend type tag
    fn backend_type(&self) -> BackendType;

    /// Whether context lines can be returned
    fn supports_context(&self) -> bool {
        false
    }

    /// Whether case-insensitive matching can be requested
    fn supports_case_insensitive(&self) -> bool {
        false
    }

    /// Whether file-name-only search is available
    fn supports_filename_search(&self) -> bool {
        false
    }

    /// Drop the options this backend cannot honour, so one option set can be
    /// applied uniformly to every backend
    fn effective_options(&self, options: &SearchOptions) -> SearchOptions {
        let mut effective = *options;
        if !self.supports_context() {
            effective.lines_before = 0;
            effective.lines_after = 0;
        }
        if !self.supports_case_insensitive() {
            effective.case_insensitive = false;
        }
        if !self.supports_filename_search() {
            effective.filenames_only = false;
        }
        effective
    }

    /// Run the query, fully paginated, and return results in backend order
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>>;
}

/// HTTP request to be made by a backend
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// URL to request
    pub url: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Query parameters, in order
    pub params: Vec<(String, String)>,
}

impl EngineRequest {
    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            params: Vec::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }
}

/// HTTP response from a backend request
#[derive(Debug)]
pub struct EngineResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: HashMap<String, String>,
    /// Response body as text
    pub text: String,
    /// Response URL (after redirects)
    pub url: String,
}

impl EngineResponse {
    /// Parse response as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.text).map_err(|e| {
            SearchError::Parse(format!("invalid JSON from {}: {}", self.url, e))
        })
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// Error describing a failed response, with a short body excerpt
    pub fn error(&self, what: &str) -> SearchError {
        let excerpt: String = self.text.chars().take(200).collect();
        SearchError::RemoteApi(format!(
            "{} failed with HTTP {}: {}",
            what, self.status, excerpt
        ))
    }
}
