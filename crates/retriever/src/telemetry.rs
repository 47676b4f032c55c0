use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Request counters for the retrieval pipeline. Cheap relaxed atomics;
/// read via `snapshot`.
#[derive(Default)]
pub struct RetrievalTelemetry {
    searches_served: AtomicU64,
    cache_hits: AtomicU64,
    keyword_branch_failures: AtomicU64,
    vector_branch_failures: AtomicU64,
    graph_branch_failures: AtomicU64,
    facet_failures: AtomicU64,
}

impl RetrievalTelemetry {
    pub fn inc_searches_served(&self) {
        self.searches_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_keyword_branch_failures(&self) {
        self.keyword_branch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_vector_branch_failures(&self) {
        self.vector_branch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_graph_branch_failures(&self) {
        self.graph_branch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_facet_failures(&self) {
        self.facet_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RetrievalTelemetrySnapshot {
        RetrievalTelemetrySnapshot {
            searches_served: self.searches_served.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            keyword_branch_failures: self.keyword_branch_failures.load(Ordering::Relaxed),
            vector_branch_failures: self.vector_branch_failures.load(Ordering::Relaxed),
            graph_branch_failures: self.graph_branch_failures.load(Ordering::Relaxed),
            facet_failures: self.facet_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalTelemetrySnapshot {
    pub searches_served: u64,
    pub cache_hits: u64,
    pub keyword_branch_failures: u64,
    pub vector_branch_failures: u64,
    pub graph_branch_failures: u64,
    pub facet_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::RetrievalTelemetry;

    #[test]
    fn snapshot_reflects_updates() {
        let telemetry = RetrievalTelemetry::default();
        telemetry.inc_searches_served();
        telemetry.inc_searches_served();
        telemetry.inc_cache_hits();
        telemetry.inc_vector_branch_failures();

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.searches_served, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.vector_branch_failures, 1);
        assert_eq!(snapshot.keyword_branch_failures, 0);
    }
}
