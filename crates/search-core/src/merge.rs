//! Merging of keyword and vector result lists.
//!
//! Entries are keyed by a canonical chunk ID so the same chunk surfaced by
//! both branches collapses into one result that remembers both sources.

use std::hash::{Hash, Hasher};

use ahash::{AHashMap, AHasher};
use common::FieldMatch;
use common::config::HybridWeights;

use crate::keyword::KeywordHit;
use crate::schema::StoredDoc;
use crate::score::{combine, normalize_scores};
use crate::vector::VectorHit;

#[derive(Debug, Clone, PartialEq)]
pub struct MergedResult {
    pub chunk_id: String,
    pub keyword: Option<KeywordHit>,
    pub vector: Option<VectorHit>,
    pub combined_score: f32,
    pub from_both_sources: bool,
    pub field_match: Option<FieldMatch>,
}

/// Canonical chunk identity for a keyword hit. Falls back through
/// progressively weaker identities, ending in a deterministic hash so a
/// degenerate document still merges stably.
pub fn keyword_chunk_id(doc: &StoredDoc) -> String {
    if !doc.document_id.is_empty() {
        return doc.document_id.clone();
    }
    if !doc.source_file.is_empty() && !doc.entity_name.is_empty() {
        return format!("{}:{}", doc.source_file, doc.entity_name);
    }
    if !doc.source_file.is_empty() {
        return doc.source_file.clone();
    }
    let mut hasher = AHasher::default();
    doc.content.hash(&mut hasher);
    doc.entity_name.hash(&mut hasher);
    doc.start_line.hash(&mut hasher);
    doc.end_line.hash(&mut hasher);
    format!("doc-{:016x}", hasher.finish())
}

/// Canonical chunk identity reconstructed from vector metadata.
pub fn vector_chunk_id(hit: &VectorHit) -> String {
    let meta = &hit.metadata;
    if !meta.source_file.is_empty() && !meta.entity_name.is_empty() {
        // Line extent of zero means the producer did not record lines.
        if meta.start_line == 0 && meta.end_line == 0 {
            return format!("{}:{}", meta.source_file, meta.entity_name);
        }
        return format!(
            "{}:{}:{}:{}",
            meta.source_file, meta.entity_name, meta.start_line, meta.end_line
        );
    }
    if !meta.source_file.is_empty() {
        return meta.source_file.clone();
    }
    hit.id.clone()
}

/// Min-max normalize keyword hits in place of their raw scores.
pub fn normalize_keyword_hits(hits: Vec<KeywordHit>) -> Vec<KeywordHit> {
    let scored: Vec<(KeywordHit, f32)> = hits
        .into_iter()
        .map(|hit| {
            let score = hit.score;
            (hit, score)
        })
        .collect();
    normalize_scores(scored)
        .into_iter()
        .map(|(mut hit, score)| {
            hit.score = score;
            hit
        })
        .collect()
}

/// Min-max normalize vector hits in place of their similarities.
pub fn normalize_vector_hits(hits: Vec<VectorHit>) -> Vec<VectorHit> {
    let scored: Vec<(VectorHit, f32)> = hits
        .into_iter()
        .map(|hit| {
            let similarity = hit.similarity;
            (hit, similarity)
        })
        .collect();
    normalize_scores(scored)
        .into_iter()
        .map(|(mut hit, similarity)| {
            hit.similarity = similarity;
            hit
        })
        .collect()
}

/// Merge two normalized result lists, fusing scores where both branches
/// surfaced the same chunk. Output is sorted by combined score descending
/// with ties broken by chunk ID ascending.
pub fn merge_results(
    keyword: Vec<KeywordHit>,
    vector: Vec<VectorHit>,
    weights: HybridWeights,
) -> Vec<MergedResult> {
    let mut merged: AHashMap<String, MergedResult> = AHashMap::new();

    for hit in keyword {
        let chunk_id = keyword_chunk_id(&hit.doc);
        let entry = merged.entry(chunk_id.clone()).or_insert_with(|| MergedResult {
            chunk_id,
            keyword: None,
            vector: None,
            combined_score: 0.0,
            from_both_sources: false,
            field_match: None,
        });
        let replace = entry
            .keyword
            .as_ref()
            .is_none_or(|existing| hit.score > existing.score);
        if replace {
            entry.field_match = hit.field_match.clone();
            entry.combined_score = combine(hit.score, 0.0, weights);
            entry.keyword = Some(hit);
        }
    }

    for hit in vector {
        let chunk_id = vector_chunk_id(&hit);
        let entry = merged.entry(chunk_id.clone()).or_insert_with(|| MergedResult {
            chunk_id,
            keyword: None,
            vector: None,
            combined_score: 0.0,
            from_both_sources: false,
            field_match: None,
        });
        let keep = entry
            .vector
            .as_ref()
            .is_none_or(|existing| hit.similarity > existing.similarity);
        if keep {
            let keyword_score = entry.keyword.as_ref().map_or(0.0, |kw| kw.score);
            entry.combined_score = combine(keyword_score, hit.similarity, weights);
            entry.from_both_sources = entry.keyword.is_some();
            entry.vector = Some(hit);
        }
    }

    let mut out: Vec<MergedResult> = merged.into_values().collect();
    out.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    out
}
