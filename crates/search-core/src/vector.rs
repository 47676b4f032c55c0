//! Embedding storage and similarity search.
//!
//! `VectorStore` is the seam between the retrieval pipeline and the
//! backing store. The Qdrant adapter is the production path; the in-memory
//! store serves tests and zero-infrastructure runs with the same contract.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::{AHashMap, AHashSet, AHasher};
use async_trait::async_trait;
use common::Chunk;
use common::config::VectorConfig;
use common::error::SearchError;
use parking_lot::RwLock;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, PointsIdsList, QueryPointsBuilder, ScalarQuantizationBuilder, ScoredPoint,
    SearchParamsBuilder, UpsertPointsBuilder, VectorParamsBuilder, value::Kind,
};
use serde::{Deserialize, Serialize};

/// Chunk fields mirrored next to each embedding for post-filtering and
/// identity reconstruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorMetadata {
    pub content: String,
    pub language: String,
    pub entity_type: String,
    pub entity_name: String,
    pub source_file: String,
    pub repository: String,
    pub start_line: u64,
    pub end_line: u64,
    pub start_byte: u64,
    pub end_byte: u64,
    pub updated_at_unix: u64,
}

impl VectorMetadata {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            content: chunk.content.clone(),
            language: chunk.language.clone(),
            entity_type: chunk.entity_type.clone(),
            entity_name: chunk.entity_name.clone(),
            source_file: chunk.source_file.clone(),
            repository: chunk.repository.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            start_byte: chunk.start_byte,
            end_byte: chunk.end_byte,
            updated_at_unix: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub metadata: VectorMetadata,
    pub similarity: f32,
}

/// The embedding collaborator: text in, fixed-dimension vector out.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;
    fn dimension(&self) -> usize;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or fully overwrite one row. The vector dimension must match
    /// the store's configured dimension.
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<(), SearchError>;

    /// Upsert many rows, grouped into configured batch sizes.
    async fn upsert_batch(
        &self,
        rows: Vec<(String, Vec<f32>, VectorMetadata)>,
    ) -> Result<(), SearchError>;

    /// Nearest rows by cosine similarity, descending, optionally cut off
    /// at a minimum similarity.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<VectorHit>, SearchError>;

    async fn delete(&self, id: &str) -> Result<bool, SearchError>;

    async fn delete_batch(&self, ids: &[String]) -> Result<usize, SearchError>;

    /// Remove every row belonging to a source file via the metadata
    /// index, never by scanning all rows.
    async fn delete_by_file(&self, source_file: &str) -> Result<usize, SearchError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (av, bv) in a.iter().zip(b.iter()) {
        dot += av * bv;
        norm_a += av * av;
        norm_b += bv * bv;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ---------------------------------------------------------------------------
// In-memory store

struct MemoryRow {
    vector: Vec<f32>,
    metadata: VectorMetadata,
}

#[derive(Default)]
struct MemoryRows {
    by_id: AHashMap<String, MemoryRow>,
    by_file: AHashMap<String, AHashSet<String>>,
}

/// Brute-force cosine store. Rows carry a logical update counter so an
/// overwrite is observable.
pub struct MemoryVectorStore {
    dimension: usize,
    batch_size: usize,
    rows: RwLock<MemoryRows>,
    update_clock: AtomicU64,
}

impl MemoryVectorStore {
    pub fn new(config: &VectorConfig) -> Self {
        Self {
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            rows: RwLock::new(MemoryRows::default()),
            update_clock: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn updated_at(&self, id: &str) -> Option<u64> {
        self.rows
            .read()
            .by_id
            .get(id)
            .map(|row| row.metadata.updated_at_unix)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), SearchError> {
        if vector.len() != self.dimension {
            return Err(SearchError::Validation(format!(
                "vector dimension {} does not match configured dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    fn insert_row(
        rows: &mut MemoryRows,
        clock: &AtomicU64,
        id: &str,
        vector: Vec<f32>,
        mut metadata: VectorMetadata,
    ) {
        metadata.updated_at_unix = clock.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = rows.by_id.get(id) {
            if let Some(ids) = rows.by_file.get_mut(&previous.metadata.source_file) {
                ids.remove(id);
            }
        }
        rows.by_file
            .entry(metadata.source_file.clone())
            .or_default()
            .insert(id.to_string());
        rows.by_id
            .insert(id.to_string(), MemoryRow { vector, metadata });
    }

    fn remove_row(rows: &mut MemoryRows, id: &str) -> bool {
        let Some(row) = rows.by_id.remove(id) else {
            return false;
        };
        if let Some(ids) = rows.by_file.get_mut(&row.metadata.source_file) {
            ids.remove(id);
            if ids.is_empty() {
                rows.by_file.remove(&row.metadata.source_file);
            }
        }
        true
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<(), SearchError> {
        self.check_dimension(&vector)?;
        let mut rows = self.rows.write();
        Self::insert_row(&mut rows, &self.update_clock, id, vector, metadata);
        Ok(())
    }

    async fn upsert_batch(
        &self,
        rows: Vec<(String, Vec<f32>, VectorMetadata)>,
    ) -> Result<(), SearchError> {
        for (_, vector, _) in &rows {
            self.check_dimension(vector)?;
        }
        for batch in rows.chunks(self.batch_size) {
            let mut guard = self.rows.write();
            for (id, vector, metadata) in batch {
                Self::insert_row(
                    &mut guard,
                    &self.update_clock,
                    id,
                    vector.clone(),
                    metadata.clone(),
                );
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<VectorHit>, SearchError> {
        self.check_dimension(query)?;
        let rows = self.rows.read();
        let mut hits: Vec<VectorHit> = rows
            .by_id
            .iter()
            .map(|(id, row)| VectorHit {
                id: id.clone(),
                metadata: row.metadata.clone(),
                similarity: cosine_similarity(query, &row.vector),
            })
            .filter(|hit| threshold.is_none_or(|cutoff| hit.similarity >= cutoff))
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> Result<bool, SearchError> {
        let mut rows = self.rows.write();
        Ok(Self::remove_row(&mut rows, id))
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<usize, SearchError> {
        let mut rows = self.rows.write();
        Ok(ids
            .iter()
            .filter(|id| Self::remove_row(&mut rows, id))
            .count())
    }

    async fn delete_by_file(&self, source_file: &str) -> Result<usize, SearchError> {
        let mut rows = self.rows.write();
        let Some(ids) = rows.by_file.remove(source_file) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            if rows.by_id.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Qdrant adapter

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationMode {
    None,
    Int8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QdrantStoreConfig {
    pub collection: String,
    pub distance: Distance,
    pub hnsw_m: u64,
    pub hnsw_ef_construct: u64,
    pub quantization: QuantizationMode,
    pub vector: VectorConfig,
}

impl Default for QdrantStoreConfig {
    fn default() -> Self {
        Self {
            collection: "code_chunks".to_string(),
            distance: Distance::Cosine,
            hnsw_m: 16,
            hnsw_ef_construct: 100,
            quantization: QuantizationMode::Int8,
            vector: VectorConfig::default(),
        }
    }
}

pub struct QdrantVectorStore {
    client: Qdrant,
    config: QdrantStoreConfig,
}

impl QdrantVectorStore {
    pub fn new(client: Qdrant, config: QdrantStoreConfig) -> Self {
        Self { client, config }
    }

    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let mut builder = CreateCollectionBuilder::new(self.config.collection.clone())
            .vectors_config(VectorParamsBuilder::new(
                self.config.vector.dimension as u64,
                self.config.distance,
            ));
        builder = match self.config.quantization {
            QuantizationMode::None => builder,
            QuantizationMode::Int8 => {
                builder.quantization_config(ScalarQuantizationBuilder::default())
            }
        };
        if let Err(err) = self.client.create_collection(builder).await {
            let message = err.to_string().to_lowercase();
            if !message.contains("already exists") {
                return Err(SearchError::vector(err));
            }
        }
        Ok(())
    }

    fn point(&self, id: &str, vector: Vec<f32>, metadata: &VectorMetadata) -> PointStruct {
        PointStruct::new(
            hash_point_id(id),
            vector,
            [
                ("vector_id", id.into()),
                ("content", metadata.content.clone().into()),
                ("language", metadata.language.clone().into()),
                ("entity_type", metadata.entity_type.clone().into()),
                ("entity_name", metadata.entity_name.clone().into()),
                ("source_file", metadata.source_file.clone().into()),
                ("repository", metadata.repository.clone().into()),
                ("start_line", (metadata.start_line as i64).into()),
                ("end_line", (metadata.end_line as i64).into()),
                ("start_byte", (metadata.start_byte as i64).into()),
                ("end_byte", (metadata.end_byte as i64).into()),
                ("updated_at_unix", (metadata.updated_at_unix as i64).into()),
            ],
        )
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), SearchError> {
        if vector.len() != self.config.vector.dimension {
            return Err(SearchError::Validation(format!(
                "vector dimension {} does not match configured dimension {}",
                vector.len(),
                self.config.vector.dimension
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<(), SearchError> {
        self.upsert_batch(vec![(id.to_string(), vector, metadata)])
            .await
    }

    async fn upsert_batch(
        &self,
        rows: Vec<(String, Vec<f32>, VectorMetadata)>,
    ) -> Result<(), SearchError> {
        for (_, vector, _) in &rows {
            self.check_dimension(vector)?;
        }
        for batch in rows.chunks(self.config.vector.batch_size.max(1)) {
            let points: Vec<PointStruct> = batch
                .iter()
                .map(|(id, vector, metadata)| self.point(id, vector.clone(), metadata))
                .collect();
            self.client
                .upsert_points(
                    UpsertPointsBuilder::new(self.config.collection.clone(), points).wait(true),
                )
                .await
                .map_err(SearchError::vector)?;
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<VectorHit>, SearchError> {
        self.check_dimension(query)?;
        let mut request = QueryPointsBuilder::new(self.config.collection.clone())
            .query(query.to_vec())
            .limit(k as u64)
            .with_payload(true)
            .params(SearchParamsBuilder::default().hnsw_ef(self.config.vector.ef_search as u64));
        if let Some(cutoff) = threshold {
            request = request.score_threshold(cutoff);
        }

        let response = self
            .client
            .query(request)
            .await
            .map_err(SearchError::vector)?;
        Ok(response.result.iter().map(scored_point_to_hit).collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, SearchError> {
        Ok(self.delete_batch(&[id.to_string()]).await? > 0)
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<usize, SearchError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let point_ids: Vec<_> = ids
            .iter()
            .map(|id| hash_point_id(id).into())
            .collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(self.config.collection.clone())
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(SearchError::vector)?;
        Ok(ids.len())
    }

    async fn delete_by_file(&self, source_file: &str) -> Result<usize, SearchError> {
        let filter = Filter::must([Condition::matches(
            "source_file",
            source_file.to_string(),
        )]);
        let count = self
            .client
            .count(
                CountPointsBuilder::new(self.config.collection.clone())
                    .filter(filter.clone())
                    .exact(true),
            )
            .await
            .map_err(SearchError::vector)?
            .result
            .map_or(0, |result| result.count as usize);

        self.client
            .delete_points(
                DeletePointsBuilder::new(self.config.collection.clone())
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(SearchError::vector)?;
        Ok(count)
    }
}

fn scored_point_to_hit(point: &ScoredPoint) -> VectorHit {
    let text = |key: &str| {
        point
            .payload
            .get(key)
            .and_then(|value| value.kind.as_ref())
            .and_then(|kind| match kind {
                Kind::StringValue(text) => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default()
    };
    let number = |key: &str| {
        point
            .payload
            .get(key)
            .and_then(|value| value.kind.as_ref())
            .and_then(|kind| match kind {
                Kind::IntegerValue(number) => Some(*number as u64),
                _ => None,
            })
            .unwrap_or_default()
    };

    VectorHit {
        id: text("vector_id"),
        metadata: VectorMetadata {
            content: text("content"),
            language: text("language"),
            entity_type: text("entity_type"),
            entity_name: text("entity_name"),
            source_file: text("source_file"),
            repository: text("repository"),
            start_line: number("start_line"),
            end_line: number("end_line"),
            start_byte: number("start_byte"),
            end_byte: number("end_byte"),
            updated_at_unix: number("updated_at_unix"),
        },
        similarity: point.score,
    }
}

fn hash_point_id(id: &str) -> u64 {
    let mut hasher = AHasher::default();
    id.hash(&mut hasher);
    hasher.finish()
}
