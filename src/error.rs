//! Error types shared by every backend and the aggregator.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Errors that can occur while configuring or running a code search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Missing or invalid backend parameter, unknown backend type or name.
    #[error("config error: {0}")]
    Config(String),

    /// The remote API asked us to wait until `reset`. Recovered internally
    /// by [`crate::network::retry_rate_limited`].
    #[error("rate limited until {reset}")]
    RateLimited { reset: DateTime<Utc> },

    /// A hosted API answered with a non rate-limit failure.
    #[error("remote API error: {0}")]
    RemoteApi(String),

    /// Transport-level failure talking to a hosted API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed matcher output, unresolved indexed path, fragment not
    /// found in refetched content, undecodable payload.
    #[error("parse error: {0}")]
    Parse(String),

    /// A file could not be read or written.
    #[error("failed to access {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The query is not a valid regular expression.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A backend failed during aggregation.
    #[error("backend {backend:?} failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: Box<SearchError>,
    },
}

impl SearchError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, SearchError>;
