//! Search orchestration.
//!
//! A request fans out to the keyword index, the vector store and the
//! graph closure concurrently, then merges, resolves graph entities to
//! documents, and assembles facets. Branches are isolated: the vector,
//! graph and facet branches degrade to empty on failure, while a keyword
//! failure fails the request unless the request runs in vector mode.
//! Cancellation is cooperative; dropping the request future abandons all
//! outstanding branch work at its next suspension point.

pub mod cache;
pub mod defaults;
pub mod telemetry;

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use ahash::AHashMap;
use common::config::{HybridWeights, SearchConfig};
use common::error::SearchError;
use common::{
    FacetValue, LineRange, SearchFilters, SearchMode, SearchRequest, SearchResponse,
    SearchResultItem,
};
use graph::{GraphClosureAdapter, RelatedEntity};
use lru::LruCache;
use search_core::keyword::{KeywordHit, KeywordIndex};
use search_core::merge::{
    MergedResult, keyword_chunk_id, merge_results, normalize_keyword_hits, normalize_vector_hits,
};
use search_core::vector::{EmbeddingProvider, VectorHit, VectorStore};
use tokio::sync::Mutex;

use crate::cache::{cache_key, cache_lookup, cache_store};
use crate::defaults::RetrievalDefaults;
use crate::telemetry::{RetrievalTelemetry, RetrievalTelemetrySnapshot};

pub struct SearchOrchestrator {
    config: SearchConfig,
    keyword: Arc<KeywordIndex>,
    vector: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    graph: Option<Arc<GraphClosureAdapter>>,
    defaults: RetrievalDefaults,
    response_cache: Option<Mutex<LruCache<String, SearchResponse>>>,
    telemetry: RetrievalTelemetry,
}

impl SearchOrchestrator {
    /// Wire the pipeline. Configuration is validated here; an invalid
    /// configuration must prevent serving.
    pub fn new(config: SearchConfig, keyword: Arc<KeywordIndex>) -> Result<Self, SearchError> {
        config.validate()?;
        Ok(Self {
            config,
            keyword,
            vector: None,
            embedder: None,
            graph: None,
            defaults: RetrievalDefaults::default(),
            response_cache: None,
            telemetry: RetrievalTelemetry::default(),
        })
    }

    pub fn with_vector(
        mut self,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        self.vector = Some(store);
        self.embedder = Some(embedder);
        self
    }

    pub fn with_graph(mut self, adapter: Arc<GraphClosureAdapter>) -> Self {
        self.graph = Some(adapter);
        self
    }

    pub fn with_defaults(mut self, defaults: RetrievalDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_response_cache(mut self) -> Self {
        let entries = NonZeroUsize::new(self.defaults.cache_entries.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        self.response_cache = Some(Mutex::new(LruCache::new(entries)));
        self
    }

    pub fn telemetry_snapshot(&self) -> RetrievalTelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        self.search_with_weights(request, None).await
    }

    /// Run a search with an optional per-request weight override.
    pub async fn search_with_weights(
        &self,
        request: &SearchRequest,
        weight_override: Option<HybridWeights>,
    ) -> Result<SearchResponse, SearchError> {
        if request.limit == 0 {
            return Ok(SearchResponse::default());
        }
        let limit = request.limit.min(self.defaults.max_limit);
        let filters = request.filters();
        filters.validate()?;
        if let Some(weights) = weight_override {
            weights.validate()?;
        }
        let weights = self.effective_weights(request.mode, weight_override);

        // The cache key does not encode weight overrides, so overridden
        // requests bypass the cache entirely.
        let cacheable = weight_override.is_none();
        let key = cache_key(request);
        if cacheable {
            if let Some(cache) = &self.response_cache {
                if let Some(hit) = cache_lookup(cache, &key).await {
                    self.telemetry.inc_cache_hits();
                    return Ok(hit);
                }
            }
        }
        self.telemetry.inc_searches_served();

        let (keyword_result, vector_result, related, facet_result) = tokio::join!(
            self.keyword_branch(request, &filters, limit),
            self.vector_branch(request, limit),
            self.graph_branch(request),
            self.facet_branch(request, &filters),
        );

        let vector_hits = match vector_result {
            Ok(hits) => hits,
            Err(err) => {
                self.telemetry.inc_vector_branch_failures();
                tracing::warn!(error = %err, "vector branch degraded to empty");
                Vec::new()
            }
        };

        let keyword_hits = match keyword_result {
            Ok(hits) => hits,
            Err(SearchError::Cancelled)
                if request.mode == SearchMode::Hybrid && !vector_hits.is_empty() =>
            {
                self.telemetry.inc_keyword_branch_failures();
                tracing::warn!("keyword branch timed out, serving vector results only");
                Vec::new()
            }
            Err(err) => {
                self.telemetry.inc_keyword_branch_failures();
                return Err(err);
            }
        };

        let facets = match facet_result {
            Ok(facets) => facets,
            Err(err) => {
                self.telemetry.inc_facet_failures();
                tracing::warn!(error = %err, "facet computation degraded to empty");
                BTreeMap::new()
            }
        };

        let mut merged = merge_results(
            normalize_keyword_hits(keyword_hits),
            normalize_vector_hits(vector_hits),
            weights,
        );

        let transitive_paths = if related.is_empty() {
            AHashMap::new()
        } else {
            self.resolve_related(&related, &filters, limit, &mut merged)?
        };

        merged.sort_by(|a, b| {
            b.combined_score
                .total_cmp(&a.combined_score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        merged.truncate(limit);

        let results: Vec<SearchResultItem> = merged
            .into_iter()
            .map(|result| to_result_item(result, &transitive_paths))
            .collect();
        let response = SearchResponse {
            total: results.len(),
            results,
            facets,
        };

        if cacheable {
            if let Some(cache) = &self.response_cache {
                cache_store(cache, key, response.clone()).await;
            }
        }
        Ok(response)
    }

    fn effective_weights(
        &self,
        mode: SearchMode,
        weight_override: Option<HybridWeights>,
    ) -> HybridWeights {
        match mode {
            SearchMode::Keyword => HybridWeights {
                keyword: 1.0,
                vector: 0.0,
            },
            SearchMode::Vector => HybridWeights {
                keyword: 0.0,
                vector: 1.0,
            },
            SearchMode::Hybrid => weight_override.unwrap_or(self.config.hybrid),
        }
    }

    async fn keyword_branch(
        &self,
        request: &SearchRequest,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<KeywordHit>, SearchError> {
        if request.mode == SearchMode::Vector {
            return Ok(Vec::new());
        }
        let index = Arc::clone(&self.keyword);
        let query = request.query.clone();
        let filters = filters.clone();
        let include_field_match = request.include_field_match;
        let task = tokio::task::spawn_blocking(move || {
            index.search_with_scores(&query, limit, &filters, include_field_match)
        });
        match tokio::time::timeout(self.defaults.branch_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(SearchError::keyword(join_err)),
            Err(_) => Err(SearchError::Cancelled),
        }
    }

    async fn vector_branch(
        &self,
        request: &SearchRequest,
        limit: usize,
    ) -> Result<Vec<VectorHit>, SearchError> {
        if request.mode == SearchMode::Keyword {
            return Ok(Vec::new());
        }
        let (Some(store), Some(embedder)) = (&self.vector, &self.embedder) else {
            return Ok(Vec::new());
        };

        let branch = async {
            let query_vector = embedder.embed(&request.query).await?;
            store.search(&query_vector, limit, None).await
        };
        match tokio::time::timeout(self.defaults.branch_timeout, branch).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Cancelled),
        }
    }

    async fn graph_branch(&self, request: &SearchRequest) -> Vec<RelatedEntity> {
        if !request.transitive {
            return Vec::new();
        }
        let Some(adapter) = &self.graph else {
            return Vec::new();
        };
        let depth = request
            .depth
            .clamp(1, self.config.transitive.max_depth.max(1));
        match tokio::time::timeout(
            self.defaults.branch_timeout,
            adapter.find_related(&request.query, depth),
        )
        .await
        {
            Ok(related) => related,
            Err(_) => {
                self.telemetry.inc_graph_branch_failures();
                tracing::warn!("graph branch timed out, returning no related entities");
                Vec::new()
            }
        }
    }

    async fn facet_branch(
        &self,
        request: &SearchRequest,
        filters: &SearchFilters,
    ) -> Result<BTreeMap<String, Vec<FacetValue>>, SearchError> {
        if request.mode == SearchMode::Vector || request.facet_limit == 0 {
            return Ok(BTreeMap::new());
        }
        let index = Arc::clone(&self.keyword);
        let query = request.query.clone();
        let filters = filters.clone();
        let facet_limit = request.facet_limit;
        let task = tokio::task::spawn_blocking(move || {
            index.compute_facets(&query, &filters, facet_limit)
        });
        match tokio::time::timeout(self.defaults.branch_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(SearchError::keyword(join_err)),
            Err(_) => Err(SearchError::Cancelled),
        }
    }

    /// Resolve closure entities to documents and merge them in. A chunk
    /// already present keeps its retrieval score and gains the
    /// relationship annotation; a chunk only reachable through the graph
    /// enters with its normalized lookup score.
    fn resolve_related(
        &self,
        related: &[RelatedEntity],
        filters: &SearchFilters,
        limit: usize,
        merged: &mut Vec<MergedResult>,
    ) -> Result<AHashMap<String, Option<Vec<String>>>, SearchError> {
        let names: Vec<String> = related
            .iter()
            .map(|entity| entity.entity_name.clone())
            .collect();
        let paths: AHashMap<&str, &Option<Vec<String>>> = related
            .iter()
            .map(|entity| (entity.entity_name.as_str(), &entity.relationship_path))
            .collect();

        let hits = self
            .keyword
            .lookup_by_entity_names(&names, limit, filters)?;
        let hits = normalize_keyword_hits(hits);

        let mut annotations: AHashMap<String, Option<Vec<String>>> = AHashMap::new();
        for hit in hits {
            let chunk_id = keyword_chunk_id(&hit.doc);
            let path = paths
                .get(hit.doc.entity_name.as_str())
                .map(|path| (*path).clone())
                .unwrap_or_default();
            annotations.insert(chunk_id.clone(), path);

            if let Some(existing) = merged.iter_mut().find(|result| result.chunk_id == chunk_id)
            {
                if existing.field_match.is_none() {
                    existing.field_match = hit.field_match.clone();
                }
                continue;
            }
            merged.push(MergedResult {
                chunk_id,
                combined_score: hit.score,
                keyword: Some(hit),
                vector: None,
                from_both_sources: false,
                field_match: None,
            });
        }
        Ok(annotations)
    }
}

fn to_result_item(
    result: MergedResult,
    transitive_paths: &AHashMap<String, Option<Vec<String>>>,
) -> SearchResultItem {
    let annotation = transitive_paths.get(&result.chunk_id);
    let is_transitive = annotation.is_some();
    let relationship_path = annotation.and_then(Clone::clone);
    let score = result.combined_score.clamp(0.0, 1.0);

    if let Some(keyword) = result.keyword {
        SearchResultItem {
            chunk_id: result.chunk_id,
            content: keyword.doc.content,
            entity_name: keyword.doc.entity_name,
            entity_type: keyword.doc.entity_type,
            source_file: keyword.doc.source_file,
            language: keyword.doc.language,
            repository: keyword.doc.repository,
            score,
            line_range: LineRange {
                start: keyword.doc.start_line,
                end: keyword.doc.end_line,
            },
            doc_summary: keyword.doc.doc_summary,
            is_transitive,
            relationship_path,
            field_match: result.field_match,
        }
    } else if let Some(vector) = result.vector {
        SearchResultItem {
            chunk_id: result.chunk_id,
            content: vector.metadata.content,
            entity_name: vector.metadata.entity_name,
            entity_type: vector.metadata.entity_type,
            source_file: vector.metadata.source_file,
            language: vector.metadata.language,
            repository: vector.metadata.repository,
            score,
            line_range: LineRange {
                start: vector.metadata.start_line,
                end: vector.metadata.end_line,
            },
            doc_summary: None,
            is_transitive,
            relationship_path,
            field_match: None,
        }
    } else {
        SearchResultItem {
            chunk_id: result.chunk_id,
            content: String::new(),
            entity_name: String::new(),
            entity_type: String::new(),
            source_file: String::new(),
            language: String::new(),
            repository: String::new(),
            score,
            line_range: LineRange { start: 0, end: 0 },
            doc_summary: None,
            is_transitive,
            relationship_path,
            field_match: None,
        }
    }
}
