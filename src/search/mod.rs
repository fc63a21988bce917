//! Search orchestration module
//!
//! Runs a query against the requested backends in order, applies each
//! backend's sort and cap policy, and records timings.

mod executor;
mod models;

pub use executor::Search;
pub use models::*;
