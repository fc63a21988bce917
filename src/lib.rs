//! codesearch-rs: one query, many code search backends
//!
//! Runs a search string against hosted code search APIs (GitHub, GitLab) and
//! local trigram indexes, and normalizes every match into a single
//! [`SearchResult`] shape.

pub mod config;
pub mod engines;
pub mod error;
pub mod index;
pub mod network;
pub mod results;
pub mod search;

pub use config::Settings;
pub use engines::{Backend, SearchOptions};
pub use error::{Result, SearchError};
pub use results::{ResultContainer, SearchResult};
pub use search::{Search, SearchQuery};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
