//! Response cache keyed by the request shape.

use std::hash::{Hash, Hasher};

use ahash::AHasher;
use common::{SearchRequest, SearchResponse};
use lru::LruCache;
use tokio::sync::Mutex;

/// Cache key covering every request field that affects the response.
pub fn cache_key(request: &SearchRequest) -> String {
    let mut hasher = AHasher::default();
    request.filters().hash(&mut hasher);
    format!(
        "{}\u{241f}{:?}\u{241f}{}\u{241f}{}\u{241f}{}\u{241f}{}\u{241f}{}\u{241f}{:016x}",
        request.query,
        request.mode,
        request.limit,
        request.transitive,
        request.depth,
        request.include_field_match,
        request.facet_limit,
        hasher.finish()
    )
}

pub async fn cache_lookup(
    cache: &Mutex<LruCache<String, SearchResponse>>,
    key: &str,
) -> Option<SearchResponse> {
    let mut guard = cache.lock().await;
    guard.get(key).cloned()
}

pub async fn cache_store(
    cache: &Mutex<LruCache<String, SearchResponse>>,
    key: String,
    response: SearchResponse,
) {
    let mut guard = cache.lock().await;
    guard.put(key, response);
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use common::{SearchMode, SearchRequest, SearchResponse};
    use lru::LruCache;
    use tokio::sync::Mutex;

    use super::{cache_key, cache_lookup, cache_store};

    #[tokio::test]
    async fn cache_roundtrip() {
        let cache = Mutex::new(LruCache::new(NonZeroUsize::new(8).expect("non-zero")));
        let key = cache_key(&SearchRequest::new("hello"));
        let payload = SearchResponse::default();

        assert!(cache_lookup(&cache, &key).await.is_none());
        cache_store(&cache, key.clone(), payload.clone()).await;
        assert_eq!(cache_lookup(&cache, &key).await, Some(payload));
    }

    #[test]
    fn key_distinguishes_mode_filters_and_limit() {
        let base = SearchRequest::new("query");
        let mut other_mode = base.clone();
        other_mode.mode = SearchMode::Keyword;
        let mut other_limit = base.clone();
        other_limit.limit = 50;
        let mut other_filter = base.clone();
        other_filter.languages.push("java".to_string());

        let keys = [
            cache_key(&base),
            cache_key(&other_mode),
            cache_key(&other_limit),
            cache_key(&other_filter),
        ];
        for (i, key) in keys.iter().enumerate() {
            for (j, other) in keys.iter().enumerate() {
                assert_eq!(i == j, key == other);
            }
        }
    }
}
