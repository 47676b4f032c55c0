//! In-memory graph backend.
//!
//! Holds inheritance edges as a reverse adjacency list: a closure from an
//! anchor walks the entities that point at it. Suitable for tests and
//! single-process runs; the production graph lives in an external service
//! behind the same trait.

use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use common::error::SearchError;
use parking_lot::RwLock;

use crate::{EdgeKind, GraphBackend, RelatedEntity};

#[derive(Debug, Clone, Default)]
struct EntityInfo {
    entity_type: Option<String>,
    source_file: Option<String>,
}

#[derive(Default)]
struct Topology {
    entities: AHashMap<String, EntityInfo>,
    /// target -> (kind, source): `source --kind--> target`.
    incoming: AHashMap<String, Vec<(EdgeKind, String)>>,
}

#[derive(Default)]
pub struct MemoryGraphBackend {
    topology: RwLock<Topology>,
}

impl MemoryGraphBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(
        &self,
        name: &str,
        entity_type: Option<&str>,
        source_file: Option<&str>,
    ) {
        self.topology.write().entities.insert(
            name.to_string(),
            EntityInfo {
                entity_type: entity_type.map(ToOwned::to_owned),
                source_file: source_file.map(ToOwned::to_owned),
            },
        );
    }

    /// Record `source --kind--> target`, e.g. `A implements I`.
    pub fn add_edge(&self, source: &str, kind: EdgeKind, target: &str) {
        let mut topology = self.topology.write();
        topology.entities.entry(source.to_string()).or_default();
        topology.entities.entry(target.to_string()).or_default();
        topology
            .incoming
            .entry(target.to_string())
            .or_default()
            .push((kind, source.to_string()));
    }

    /// Breadth-first walk of incoming edges from the anchor, bounded by
    /// `depth` hops. The visited set both deduplicates entities reachable
    /// through multiple paths and terminates cycles.
    fn closure(&self, anchor: &str, depth: u32, kinds: &[EdgeKind]) -> Vec<RelatedEntity> {
        let topology = self.topology.read();
        let mut visited: AHashSet<String> = AHashSet::new();
        visited.insert(anchor.to_string());

        let mut out = Vec::new();
        let mut frontier: Vec<(String, Vec<String>)> =
            vec![(anchor.to_string(), vec![anchor.to_string()])];

        for _ in 0..depth {
            let mut next = Vec::new();
            for (node, path) in frontier {
                let Some(edges) = topology.incoming.get(&node) else {
                    continue;
                };
                for (kind, source) in edges {
                    if !kinds.contains(kind) || !visited.insert(source.clone()) {
                        continue;
                    }
                    let mut source_path = path.clone();
                    source_path.push(source.clone());
                    let info = topology.entities.get(source).cloned().unwrap_or_default();
                    out.push(RelatedEntity {
                        entity_name: source.clone(),
                        entity_type: info.entity_type,
                        source_file: info.source_file,
                        relationship_path: Some(source_path.clone()),
                    });
                    next.push((source.clone(), source_path));
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }
}

#[async_trait]
impl GraphBackend for MemoryGraphBackend {
    async fn implements_closure(
        &self,
        entity: &str,
        depth: u32,
    ) -> Result<Vec<RelatedEntity>, SearchError> {
        Ok(self.closure(entity, depth, &[EdgeKind::Implements, EdgeKind::Extends]))
    }

    async fn extends_closure(
        &self,
        entity: &str,
        depth: u32,
    ) -> Result<Vec<RelatedEntity>, SearchError> {
        Ok(self.closure(entity, depth, &[EdgeKind::Extends]))
    }
}
