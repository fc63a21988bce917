//! Search execution and orchestration

use super::models::SearchQuery;
use crate::engines::{Backend, BackendRegistry};
use crate::error::{Result, SearchError};
use crate::results::ResultContainer;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Search executor that runs a query against several backends in turn
pub struct Search {
    /// Backend registry
    registry: Arc<BackendRegistry>,
}

impl Search {
    /// Create a new search executor
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    /// Execute a search query across all requested backends.
    ///
    /// Backends run one after the other in the requested order. The first
    /// failure aborts the whole search and no partial results are returned.
    pub async fn execute(&self, query: &SearchQuery) -> Result<ResultContainer> {
        // resolve every name before any backend runs
        let backends = query
            .backends
            .iter()
            .map(|name| {
                self.registry
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SearchError::Config(format!("backend {:?} not found", name)))
            })
            .collect::<Result<Vec<Arc<dyn Backend>>>>()?;

        info!(
            "Executing search '{}' on {} backends",
            query.query,
            backends.len()
        );

        let mut container = ResultContainer::new();
        for backend in backends {
            let name = backend.name().to_string();
            let options = backend.effective_options(&query.options);
            let start = Instant::now();

            let results = backend
                .search(&query.query, &options)
                .await
                .map_err(|e| {
                    warn!("Backend {} failed: {}", name, e);
                    SearchError::Backend {
                        backend: name.clone(),
                        source: Box::new(e),
                    }
                })?;
            let elapsed = start.elapsed();

            let returned = results.len();
            let results = self.registry.get_policy(&name).apply(results);
            debug!(
                "Backend {} returned {} results ({} kept) in {:?}",
                name,
                returned,
                results.len(),
                elapsed
            );

            container.add_backend_results(name, results, elapsed);
        }

        Ok(container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::engines::{BackendType, SearchOptions};
    use crate::results::SearchResult;
    use crate::search::SortOrder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeBackend {
        name: String,
        paths: Vec<&'static str>,
        fail: bool,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Option<SearchOptions>>>,
    }

    impl FakeBackend {
        fn new(name: &str, paths: &[&'static str]) -> Self {
            Self {
                name: name.to_string(),
                paths: paths.to_vec(),
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(None)),
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(name, &[])
            }
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn name(&self) -> &str {
            &self.name
        }

        fn backend_type(&self) -> BackendType {
            BackendType::Csearch
        }

        fn supports_context(&self) -> bool {
            true
        }

        async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some(*options);
            if self.fail {
                return Err(SearchError::RemoteApi("boom".to_string()));
            }
            Ok(self
                .paths
                .iter()
                .enumerate()
                .map(|(i, p)| SearchResult::line_match(&self.name, *p, i + 1, query, 0, query.len()))
                .collect())
        }
    }

    fn config(sort: SortOrder, max_results: usize) -> BackendConfig {
        BackendConfig {
            backend_type: "csearch".to_string(),
            sort,
            max_results,
            ..Default::default()
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_policies_and_stats() {
        let mut registry = BackendRegistry::new();
        registry.register(
            Arc::new(FakeBackend::new("asc", &["c", "a", "b"])),
            config(SortOrder::Ascending, 0),
        );
        registry.register(
            Arc::new(FakeBackend::new("desc", &["a", "c", "b"])),
            config(SortOrder::Descending, 2),
        );
        registry.register(
            Arc::new(FakeBackend::new("raw", &["z", "a"])),
            config(SortOrder::Unmodified, 0),
        );
        let search = Search::new(Arc::new(registry));

        let query = SearchQuery::new("needle", names(&["raw", "asc", "desc"]));
        let container = search.execute(&query).await.unwrap();

        let paths: Vec<(&str, &str)> = container
            .results()
            .iter()
            .map(|r| (r.backend.as_str(), r.path.as_str()))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("raw", "z"),
                ("raw", "a"),
                ("asc", "a"),
                ("asc", "b"),
                ("asc", "c"),
                ("desc", "c"),
                ("desc", "b"),
            ]
        );

        let timings: Vec<(&str, usize)> = container
            .timings()
            .iter()
            .map(|t| (t.backend.as_str(), t.result_count))
            .collect();
        assert_eq!(timings, vec![("raw", 2), ("asc", 3), ("desc", 2)]);
    }

    #[tokio::test]
    async fn test_failure_aborts_without_partial_results() {
        let first = FakeBackend::new("a", &["1", "2", "3", "4", "5"]);
        let last = FakeBackend::new("c", &["x"]);
        let last_calls = last.calls.clone();

        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(first), config(SortOrder::Unmodified, 0));
        registry.register(Arc::new(FakeBackend::failing("b")), config(SortOrder::Unmodified, 0));
        registry.register(Arc::new(last), config(SortOrder::Unmodified, 0));
        let search = Search::new(Arc::new(registry));

        let err = search
            .execute(&SearchQuery::new("q", names(&["a", "b", "c"])))
            .await
            .unwrap_err();

        match err {
            SearchError::Backend { backend, source } => {
                assert_eq!(backend, "b");
                assert!(matches!(*source, SearchError::RemoteApi(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(last_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_backend_fails_before_searching() {
        let known = FakeBackend::new("known", &["a"]);
        let calls = known.calls.clone();

        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(known), config(SortOrder::Unmodified, 0));
        let search = Search::new(Arc::new(registry));

        let err = search
            .execute(&SearchQuery::new("q", names(&["known", "ghost"])))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "config error: backend \"ghost\" not found");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_options_are_masked() {
        let backend = FakeBackend::new("ctx", &["a"]);
        let seen = backend.seen.clone();

        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(backend), config(SortOrder::Unmodified, 0));
        let search = Search::new(Arc::new(registry));

        let options = SearchOptions::new()
            .with_context(2)
            .case_insensitive(true)
            .filenames_only(true);
        let query = SearchQuery::new("q", names(&["ctx"])).with_options(options);
        search.execute(&query).await.unwrap();

        let seen = seen.lock().unwrap().unwrap();
        assert_eq!(seen.lines_before, 2);
        assert_eq!(seen.lines_after, 2);
        assert!(!seen.case_insensitive);
        assert!(!seen.filenames_only);
    }

    #[tokio::test]
    async fn test_empty_request() {
        let search = Search::new(Arc::new(BackendRegistry::new()));
        let container = search.execute(&SearchQuery::new("q", Vec::new())).await.unwrap();
        assert_eq!(container.results().len(), 0);
        assert!(container.timings().is_empty());
    }
}
