use std::time::Duration;

/// Orchestrator-level ceilings and timeouts. These are process defaults,
/// not configuration-file options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalDefaults {
    /// Hard cap on the per-request result limit.
    pub max_limit: usize,
    /// How long each retrieval branch may run before it is abandoned.
    pub branch_timeout: Duration,
    /// Capacity of the optional response cache.
    pub cache_entries: usize,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            max_limit: 100,
            branch_timeout: Duration::from_secs(10),
            cache_entries: 256,
        }
    }
}
