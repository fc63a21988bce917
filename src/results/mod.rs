//! Normalized result records and the container the aggregator fills
//!
//! Every backend converts its native response into [`SearchResult`] values.

mod container;
mod types;

pub use container::ResultContainer;
pub use types::*;
