//! Knowledge graph store
//!
//! A directed graph of entities and predicate-labeled relations, held in
//! memory and written through to a JSON snapshot on every mutation under
//! the graph lock. At most one edge exists per ordered (subject, object)
//! pair; a second relation between the same pair overwrites the first.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::lock::{LockManager, LockResource};
use crate::value::AttrMap;

/// Canonical entity identity: lowercase, spaces replaced by underscores
pub fn normalize_entity_id(raw: &str) -> String {
    raw.to_lowercase().replace(' ', "_")
}

/// A graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: AttrMap,
    pub created_at: DateTime<Utc>,
}

/// Attributes of a directed edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationAttrs {
    /// Stored upper-cased
    pub predicate: String,
    pub weight: f32,
    /// Provenance tag, e.g. the daily-log entry the relation came from
    pub source_doc: String,
    pub created_at: DateTime<Utc>,
}

/// An extraction result used as input to entity/relation creation;
/// never persisted on its own
#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub subject_type: String,
    pub object_type: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            subject_type: "unknown".to_string(),
            object_type: "unknown".to_string(),
        }
    }

    pub fn with_types(
        mut self,
        subject_type: impl Into<String>,
        object_type: impl Into<String>,
    ) -> Self {
        self.subject_type = subject_type.into();
        self.object_type = object_type.into();
        self
    }
}

/// Neighbor traversal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// Graph-level counters and histograms
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
    pub entity_types: BTreeMap<String, usize>,
    pub predicates: BTreeMap<String, usize>,
}

/// Snapshot edge record as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeRecord {
    source: String,
    target: String,
    predicate: String,
    weight: f32,
    #[serde(default)]
    source_doc: String,
    created_at: DateTime<Utc>,
}

/// Persisted snapshot form: node list plus edge list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphSnapshot {
    #[serde(default)]
    nodes: Vec<Entity>,
    #[serde(default)]
    edges: Vec<EdgeRecord>,
}

#[derive(Debug, Default)]
struct GraphInner {
    nodes: BTreeMap<String, Entity>,
    /// subject -> object -> edge attrs; the map structure itself enforces
    /// the single-edge-per-ordered-pair model
    out: BTreeMap<String, BTreeMap<String, RelationAttrs>>,
    /// object -> subjects with an edge into it
    incoming: BTreeMap<String, BTreeSet<String>>,
}

impl GraphInner {
    fn upsert_entity(&mut self, id: &str, name: &str, kind: &str, attributes: AttrMap) {
        match self.nodes.get_mut(id) {
            Some(existing) => {
                // Update in place; id identity and creation time are preserved
                existing.name = name.to_string();
                existing.kind = kind.to_string();
                existing.attributes = attributes;
            }
            None => {
                self.nodes.insert(
                    id.to_string(),
                    Entity {
                        id: id.to_string(),
                        name: name.to_string(),
                        kind: kind.to_string(),
                        attributes,
                        created_at: Utc::now(),
                    },
                );
            }
        }
    }

    fn ensure_entity(&mut self, id: &str) {
        if !self.nodes.contains_key(id) {
            self.upsert_entity(id, id, "unknown", AttrMap::new());
        }
    }

    fn insert_edge(&mut self, subject: &str, object: &str, attrs: RelationAttrs) {
        self.ensure_entity(subject);
        self.ensure_entity(object);
        self.out
            .entry(subject.to_string())
            .or_default()
            .insert(object.to_string(), attrs);
        self.incoming
            .entry(object.to_string())
            .or_default()
            .insert(subject.to_string());
    }

    fn remove_edge(&mut self, subject: &str, object: &str) -> bool {
        let removed = self
            .out
            .get_mut(subject)
            .map(|targets| targets.remove(object).is_some())
            .unwrap_or(false);
        if removed {
            if let Some(sources) = self.incoming.get_mut(object) {
                sources.remove(subject);
            }
        }
        removed
    }

    fn relation_count(&self) -> usize {
        self.out.values().map(|t| t.len()).sum()
    }
}

/// Knowledge graph store with write-through snapshot persistence
pub struct GraphStore {
    path: PathBuf,
    locks: Arc<LockManager>,
    inner: RwLock<GraphInner>,
    recovered: bool,
    lock_timeout: std::time::Duration,
}

impl GraphStore {
    /// Open the store, eagerly loading the snapshot.
    ///
    /// A corrupt or unparsable snapshot is recovered as an empty graph:
    /// logged and counted, never fatal.
    pub fn open(config: &StoreConfig, locks: Arc<LockManager>) -> Result<Self> {
        let path = config.graph_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut recovered = false;
        let inner = match Self::load_snapshot(&path) {
            Ok(inner) => inner,
            Err(e) => {
                log::warn!(
                    "knowledge graph snapshot unreadable, starting empty: {}",
                    e
                );
                recovered = true;
                GraphInner::default()
            }
        };

        log::info!(
            "GraphStore opened at {} ({} entities, {} relations)",
            path.display(),
            inner.nodes.len(),
            inner.relation_count()
        );

        Ok(Self {
            path,
            locks,
            inner: RwLock::new(inner),
            recovered,
            lock_timeout: config.lock_timeout,
        })
    }

    /// True if the snapshot on disk was corrupt at open and the store
    /// started from an empty graph
    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered
    }

    fn load_snapshot(path: &PathBuf) -> Result<GraphInner> {
        if !path.exists() {
            return Ok(GraphInner::default());
        }
        let bytes = std::fs::read(path)?;
        let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::corrupt("knowledge graph", e.to_string()))?;

        let mut inner = GraphInner::default();
        for node in snapshot.nodes {
            inner.nodes.insert(node.id.clone(), node);
        }
        for edge in snapshot.edges {
            inner.insert_edge(
                &edge.source,
                &edge.target,
                RelationAttrs {
                    predicate: edge.predicate,
                    weight: edge.weight,
                    source_doc: edge.source_doc,
                    created_at: edge.created_at,
                },
            );
        }
        Ok(inner)
    }

    /// Serialize the full graph and replace the snapshot atomically.
    /// Callers hold the graph lock.
    fn persist(&self, inner: &GraphInner) -> Result<()> {
        let snapshot = GraphSnapshot {
            nodes: inner.nodes.values().cloned().collect(),
            edges: inner
                .out
                .iter()
                .flat_map(|(source, targets)| {
                    targets.iter().map(move |(target, attrs)| EdgeRecord {
                        source: source.clone(),
                        target: target.clone(),
                        predicate: attrs.predicate.clone(),
                        weight: attrs.weight,
                        source_doc: attrs.source_doc.clone(),
                        created_at: attrs.created_at,
                    })
                })
                .collect(),
        };

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn graph_lock(&self) -> Result<crate::lock::LockGuard> {
        self.locks
            .acquire(LockResource::GraphSnapshot, self.lock_timeout)
    }

    /// Add or update an entity (upsert). Updating preserves id identity and
    /// creation time.
    pub fn add_entity(
        &self,
        id: &str,
        name: &str,
        kind: &str,
        attributes: Option<AttrMap>,
    ) -> Result<bool> {
        let _guard = self.graph_lock()?;
        let mut inner = self.inner.write();
        inner.upsert_entity(id, name, kind, attributes.unwrap_or_default());
        self.persist(&inner)?;
        Ok(true)
    }

    /// Add a relation, implicitly creating missing endpoints as entities of
    /// type "unknown". The predicate is upper-cased before storage, and an
    /// existing edge on the same ordered pair is overwritten.
    pub fn add_relation(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
        weight: f32,
        source: &str,
    ) -> Result<bool> {
        let _guard = self.graph_lock()?;
        let mut inner = self.inner.write();
        inner.insert_edge(
            subject,
            object,
            RelationAttrs {
                predicate: predicate.to_uppercase(),
                weight,
                source_doc: source.to_string(),
                created_at: Utc::now(),
            },
        );
        self.persist(&inner)?;
        Ok(true)
    }

    /// Add an extracted triple: normalizes subject/object text to entity
    /// ids, upserts both entities with the triple's type hints, then adds
    /// the relation. One lock acquisition, one snapshot write.
    pub fn add_triple(&self, triple: &Triple, source: &str) -> Result<bool> {
        let subject_id = normalize_entity_id(&triple.subject);
        let object_id = normalize_entity_id(&triple.object);

        let _guard = self.graph_lock()?;
        let mut inner = self.inner.write();
        inner.upsert_entity(&subject_id, &triple.subject, &triple.subject_type, AttrMap::new());
        inner.upsert_entity(&object_id, &triple.object, &triple.object_type, AttrMap::new());
        inner.insert_edge(
            &subject_id,
            &object_id,
            RelationAttrs {
                predicate: triple.predicate.to_uppercase(),
                weight: 1.0,
                source_doc: source.to_string(),
                created_at: Utc::now(),
            },
        );
        self.persist(&inner)?;
        Ok(true)
    }

    /// Linear scan over all edges with independent optional equality
    /// filters, composed with AND. The predicate filter is
    /// case-insensitive.
    pub fn query_relations(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Vec<(String, String, String, RelationAttrs)> {
        let wanted_predicate = predicate.map(str::to_uppercase);
        let inner = self.inner.read();

        let mut results = Vec::new();
        for (s, targets) in &inner.out {
            if let Some(subject) = subject {
                if s != subject {
                    continue;
                }
            }
            for (o, attrs) in targets {
                if let Some(object) = object {
                    if o != object {
                        continue;
                    }
                }
                if let Some(ref p) = wanted_predicate {
                    if &attrs.predicate != p {
                        continue;
                    }
                }
                results.push((s.clone(), attrs.predicate.clone(), o.clone(), attrs.clone()));
            }
        }
        results
    }

    /// Neighbors of an entity, optionally filtered by predicate.
    /// An absent entity yields an empty list, not an error.
    pub fn query_neighbors(
        &self,
        entity_id: &str,
        predicate: Option<&str>,
        direction: Direction,
    ) -> Vec<(String, String, Entity)> {
        let wanted = predicate.map(str::to_uppercase);
        let inner = self.inner.read();
        if !inner.nodes.contains_key(entity_id) {
            return Vec::new();
        }

        let mut results = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            if let Some(targets) = inner.out.get(entity_id) {
                for (neighbor, attrs) in targets {
                    if let Some(ref p) = wanted {
                        if &attrs.predicate != p {
                            continue;
                        }
                    }
                    if let Some(entity) = inner.nodes.get(neighbor) {
                        results.push((neighbor.clone(), attrs.predicate.clone(), entity.clone()));
                    }
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            if let Some(sources) = inner.incoming.get(entity_id) {
                for neighbor in sources {
                    let Some(attrs) = inner.out.get(neighbor).and_then(|t| t.get(entity_id)) else {
                        continue;
                    };
                    if let Some(ref p) = wanted {
                        if &attrs.predicate != p {
                            continue;
                        }
                    }
                    if let Some(entity) = inner.nodes.get(neighbor) {
                        results.push((neighbor.clone(), attrs.predicate.clone(), entity.clone()));
                    }
                }
            }
        }
        results
    }

    /// Multi-hop reasoning: depth-first search from `start` following
    /// outgoing edges whose predicates match `predicates` in order.
    ///
    /// A path is emitted once every predicate has been consumed; the search
    /// is pruned when the node-path length exceeds `max_depth`, so a
    /// predicate sequence longer than `max_depth` yields no paths. All
    /// matching paths are returned in visit order.
    pub fn multi_hop(
        &self,
        start: &str,
        predicates: &[&str],
        max_depth: usize,
    ) -> Vec<Vec<String>> {
        let inner = self.inner.read();
        if !inner.nodes.contains_key(start) {
            return Vec::new();
        }

        let wanted: Vec<String> = predicates.iter().map(|p| p.to_uppercase()).collect();
        let mut paths = Vec::new();
        let mut path = vec![start.to_string()];
        Self::dfs(&inner, start, &wanted, max_depth, &mut path, &mut paths);
        paths
    }

    fn dfs(
        inner: &GraphInner,
        current: &str,
        remaining: &[String],
        max_depth: usize,
        path: &mut Vec<String>,
        paths: &mut Vec<Vec<String>>,
    ) {
        let Some((next_predicate, rest)) = remaining.split_first() else {
            paths.push(path.clone());
            return;
        };
        if path.len() > max_depth {
            return;
        }

        if let Some(targets) = inner.out.get(current) {
            for (neighbor, attrs) in targets {
                if &attrs.predicate == next_predicate {
                    path.push(neighbor.clone());
                    Self::dfs(inner, neighbor, rest, max_depth, path, paths);
                    path.pop();
                }
            }
        }
    }

    /// Point query for a single entity
    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.inner.read().nodes.get(id).cloned()
    }

    /// All entities, optionally filtered by type
    pub fn entities(&self, kind: Option<&str>) -> Vec<Entity> {
        self.inner
            .read()
            .nodes
            .values()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect()
    }

    /// Remove an entity and all incident edges. Returns false if absent.
    pub fn delete_entity(&self, id: &str) -> Result<bool> {
        let _guard = self.graph_lock()?;
        let mut inner = self.inner.write();
        if inner.nodes.remove(id).is_none() {
            return Ok(false);
        }

        // Outgoing edges and their reverse-index entries
        if let Some(targets) = inner.out.remove(id) {
            for object in targets.keys() {
                if let Some(sources) = inner.incoming.get_mut(object) {
                    sources.remove(id);
                }
            }
        }
        // Incoming edges
        if let Some(sources) = inner.incoming.remove(id) {
            for subject in sources {
                if let Some(targets) = inner.out.get_mut(&subject) {
                    targets.remove(id);
                }
            }
        }

        self.persist(&inner)?;
        Ok(true)
    }

    /// Remove the edge between an ordered pair. Returns false if absent.
    pub fn delete_relation(&self, subject: &str, object: &str) -> Result<bool> {
        let _guard = self.graph_lock()?;
        let mut inner = self.inner.write();
        if !inner.remove_edge(subject, object) {
            return Ok(false);
        }
        self.persist(&inner)?;
        Ok(true)
    }

    /// Entity/relation counts plus type and predicate histograms
    pub fn stats(&self) -> GraphStats {
        let inner = self.inner.read();

        let mut entity_types: BTreeMap<String, usize> = BTreeMap::new();
        for entity in inner.nodes.values() {
            *entity_types.entry(entity.kind.clone()).or_insert(0) += 1;
        }

        let mut predicates: BTreeMap<String, usize> = BTreeMap::new();
        for targets in inner.out.values() {
            for attrs in targets.values() {
                *predicates.entry(attrs.predicate.clone()).or_insert(0) += 1;
            }
        }

        GraphStats {
            entity_count: inner.nodes.len(),
            relation_count: inner.relation_count(),
            entity_types,
            predicates,
        }
    }
}
