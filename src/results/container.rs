//! Result container for collecting per-backend results and timings

use super::types::*;
use std::time::Duration;

/// Container for the merged output of one aggregation
#[derive(Debug, Clone, Default)]
pub struct ResultContainer {
    /// Results in backend order, each backend's block already sorted and capped
    results: Vec<SearchResult>,
    /// One timing entry per backend, in execution order
    timings: Vec<Timing>,
}

impl ResultContainer {
    /// Create a new empty result container
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one backend's results and record its timing
    pub fn add_backend_results(
        &mut self,
        backend: impl Into<String>,
        results: Vec<SearchResult>,
        duration: Duration,
    ) {
        self.timings.push(Timing {
            backend: backend.into(),
            duration,
            result_count: results.len(),
        });
        self.results.extend(results);
    }

    /// All results, in backend order
    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    /// Get timings
    pub fn timings(&self) -> &[Timing] {
        &self.timings
    }

    /// Sum of all backend durations
    pub fn total_duration(&self) -> Duration {
        self.timings.iter().map(|t| t.duration).sum()
    }
}
