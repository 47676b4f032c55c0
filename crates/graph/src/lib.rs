//! Bounded transitive closures over the inheritance graph.
//!
//! The graph itself lives behind `GraphBackend`; this crate dispatches
//! structural queries to the right closure, clamps depth, deduplicates
//! entities reachable through multiple paths, and degrades to an empty
//! result when the backend is unavailable.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use common::error::SearchError;
use common::structural::{StructuralQuery, classify};
use serde::{Deserialize, Serialize};

pub const MIN_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 10;

/// An entity reachable from a closure anchor. `relationship_path` walks
/// from the anchor to this entity, inclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedEntity {
    pub entity_name: String,
    pub entity_type: Option<String>,
    pub source_file: Option<String>,
    pub relationship_path: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Implements,
    Extends,
}

#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Entities reaching the anchor over `IMPLEMENTS|EXTENDS` edges,
    /// bounded by `depth`.
    async fn implements_closure(
        &self,
        entity: &str,
        depth: u32,
    ) -> Result<Vec<RelatedEntity>, SearchError>;

    /// Entities reaching the anchor over `EXTENDS` edges only.
    async fn extends_closure(
        &self,
        entity: &str,
        depth: u32,
    ) -> Result<Vec<RelatedEntity>, SearchError>;
}

pub fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(MIN_DEPTH, MAX_DEPTH)
}

pub struct GraphClosureAdapter {
    backend: Arc<dyn GraphBackend>,
}

impl GraphClosureAdapter {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self { backend }
    }

    /// Run the closure matching the query's structural predicate.
    /// Non-structural queries and unavailable backends both yield an
    /// empty list; the latter logs a warning instead of failing the
    /// request.
    pub async fn find_related(&self, query: &str, depth: u32) -> Vec<RelatedEntity> {
        let Some(structural) = classify(query) else {
            return Vec::new();
        };
        let depth = clamp_depth(depth);

        let related = match &structural {
            StructuralQuery::Implements(name) => {
                self.backend.implements_closure(name, depth).await
            }
            StructuralQuery::Extends(name) => self.backend.extends_closure(name, depth).await,
            StructuralQuery::Usages(name) => {
                match (
                    self.backend.implements_closure(name, depth).await,
                    self.backend.extends_closure(name, depth).await,
                ) {
                    (Ok(mut implementers), Ok(extenders)) => {
                        implementers.extend(extenders);
                        Ok(implementers)
                    }
                    (Err(err), _) | (_, Err(err)) => Err(err),
                }
            }
        };

        match related {
            Ok(entities) => dedup_by_name(entities),
            Err(err) => {
                tracing::warn!(
                    query,
                    error = %err,
                    "graph backend unavailable, returning no related entities"
                );
                Vec::new()
            }
        }
    }
}

/// Each entity at most once, first occurrence wins.
fn dedup_by_name(entities: Vec<RelatedEntity>) -> Vec<RelatedEntity> {
    let mut seen = ahash::AHashSet::new();
    entities
        .into_iter()
        .filter(|entity| seen.insert(entity.entity_name.clone()))
        .collect()
}
