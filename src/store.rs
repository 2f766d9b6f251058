//! Document and vector store
//!
//! RocksDB-backed store holding documents, their fixed-dimension embedding
//! vectors, and a derived BM25 lexical index. Vector KNN search uses an
//! instant-distance HNSW index with a linear-scan fallback; the lexical
//! index is rebuilt in lock-step with every insert/update/delete and needs
//! no external capability.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::RwLock;
use rocksdb::{IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::lock::{LockManager, LockResource};
use crate::value::AttrMap;

const DOC_PREFIX: &str = "doc:";
const VEC_PREFIX: &str = "vec:";
const DIMENSION_KEY: &[u8] = b"_meta:dimension";

/// A stored document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: AttrMap,
    pub created_at: DateTime<Utc>,
}

/// Vector search result, ascending by distance
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub metadata: AttrMap,
    /// Cosine distance to the query (0 = identical direction)
    pub distance: f32,
    /// `1 / (1 + distance)`, bounded in (0, 1]
    pub score: f32,
}

/// Full-text search result, ascending by rank (more negative = more relevant)
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub id: String,
    pub content: String,
    pub metadata: AttrMap,
    /// Matching region with `>>>`/`<<<` highlight markers
    pub snippet: String,
    /// Negated BM25 score, following the FTS convention that smaller
    /// ranks sort first
    pub rank: f32,
}

/// HNSW point wrapper
#[derive(Clone)]
struct DocPoint {
    id: String,
    vector: Vec<f32>,
}

impl Point for DocPoint {
    fn distance(&self, other: &Self) -> f32 {
        // Cosine distance = 1 - similarity (HNSW finds minimum)
        1.0 - cosine_similarity(&self.vector, &other.vector)
    }
}

struct HnswIndex {
    hnsw: HnswMap<DocPoint, DocPoint>,
}

/// RocksDB-backed hybrid retrieval store
pub struct DocumentStore {
    db: Arc<DB>,
    dimension: usize,
    locks: Arc<LockManager>,
    lock_timeout: std::time::Duration,
    doc_cache: Arc<DashMap<String, Document>>,
    vector_cache: Arc<DashMap<String, Vec<f32>>>,
    hnsw_index: Arc<RwLock<Option<HnswIndex>>>,
    hnsw_points: Arc<RwLock<Vec<DocPoint>>>,
    lexical: Arc<RwLock<Bm25Index>>,
}

impl DocumentStore {
    /// Open (or create) the store under the configured `.vector/` directory.
    ///
    /// The embedding dimension is fixed when the database is first created;
    /// on reopen the stored dimension is authoritative.
    pub fn open(config: &StoreConfig, locks: Arc<LockManager>) -> Result<Self> {
        let path = config.vector_dir();
        std::fs::create_dir_all(&path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, &path)?;

        let dimension = match db.get(DIMENSION_KEY)? {
            Some(bytes) => {
                let stored = bytes
                    .as_slice()
                    .try_into()
                    .map(u32::from_le_bytes)
                    .map_err(|_| StoreError::corrupt("vector store", "bad dimension record"))?
                    as usize;
                if stored != config.dimension {
                    log::warn!(
                        "store created with dimension {}, ignoring configured {}",
                        stored,
                        config.dimension
                    );
                }
                stored
            }
            None => {
                db.put(DIMENSION_KEY, (config.dimension as u32).to_le_bytes())?;
                config.dimension
            }
        };

        log::info!(
            "DocumentStore opened at {} ({}d vectors)",
            path.display(),
            dimension
        );

        let store = Self {
            db: Arc::new(db),
            dimension,
            locks,
            lock_timeout: config.lock_timeout,
            doc_cache: Arc::new(DashMap::new()),
            vector_cache: Arc::new(DashMap::new()),
            hnsw_index: Arc::new(RwLock::new(None)),
            hnsw_points: Arc::new(RwLock::new(Vec::new())),
            lexical: Arc::new(RwLock::new(Bm25Index::default())),
        };

        store.load_cache()?;
        Ok(store)
    }

    /// Load documents and vectors into the caches on open. Records that
    /// fail to deserialize are skipped with a warning, not fatal.
    fn load_cache(&self) -> Result<()> {
        let mut count = 0;
        let mut skipped = 0;
        let mut points = Vec::new();

        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item?;
            let key_str = String::from_utf8_lossy(&key);

            if let Some(id) = key_str.strip_prefix(DOC_PREFIX) {
                match bincode::deserialize::<Document>(&value) {
                    Ok(doc) => {
                        self.doc_cache.insert(id.to_string(), doc);
                        count += 1;
                    }
                    Err(e) => {
                        log::warn!("failed to deserialize document {}: {}. Skipping.", id, e);
                        skipped += 1;
                    }
                }
            } else if let Some(id) = key_str.strip_prefix(VEC_PREFIX) {
                match bincode::deserialize::<Vec<f32>>(&value) {
                    Ok(vector) => {
                        self.vector_cache.insert(id.to_string(), vector.clone());
                        points.push(DocPoint {
                            id: id.to_string(),
                            vector,
                        });
                    }
                    Err(e) => {
                        log::warn!("failed to deserialize vector {}: {}. Skipping.", id, e);
                        skipped += 1;
                    }
                }
            }
        }

        if count > 0 {
            log::info!("loaded {} documents from disk", count);
        }
        if skipped > 0 {
            log::warn!("skipped {} corrupt records", skipped);
        }
        if !points.is_empty() {
            self.rebuild_hnsw_index(points);
        }
        self.rebuild_lexical();
        Ok(())
    }

    /// Fixed embedding dimension of this store
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or replace a document with its embedding.
    ///
    /// The dimension guard runs before any write: a mismatched vector is
    /// rejected and the store is left unchanged.
    pub fn add(
        &self,
        id: &str,
        content: &str,
        embedding: &[f32],
        metadata: AttrMap,
    ) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let _guard = self.locks.acquire(LockResource::VectorDb, self.lock_timeout)?;

        let doc = Document {
            id: id.to_string(),
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        self.db
            .put(format!("{DOC_PREFIX}{id}").as_bytes(), bincode::serialize(&doc)?)?;
        self.db.put(
            format!("{VEC_PREFIX}{id}").as_bytes(),
            bincode::serialize(&embedding.to_vec())?,
        )?;
        self.db.flush()?;

        self.doc_cache.insert(id.to_string(), doc);
        self.vector_cache.insert(id.to_string(), embedding.to_vec());

        let all_points = {
            let mut points = self.hnsw_points.write();
            points.retain(|p| p.id != id);
            points.push(DocPoint {
                id: id.to_string(),
                vector: embedding.to_vec(),
            });
            points.clone()
        };
        self.rebuild_hnsw_index(all_points);
        self.rebuild_lexical();
        Ok(())
    }

    /// K-nearest-neighbor search by cosine distance, ascending.
    ///
    /// The optional metadata filter requires equality on every given key
    /// (AND). An empty store yields an empty list.
    pub fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        metadata_filter: Option<&AttrMap>,
    ) -> Result<Vec<SearchHit>> {
        if query_embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }

        // Overfetch when filtering so enough candidates survive
        let candidate_limit = match metadata_filter {
            Some(_) => top_k.saturating_mul(4).max(top_k),
            None => top_k,
        };

        let mut hits = Vec::new();
        for (id, distance) in self.knn(query_embedding, candidate_limit) {
            let Some(doc) = self.doc_cache.get(&id) else {
                continue;
            };
            if let Some(filter) = metadata_filter {
                let matches = filter
                    .iter()
                    .all(|(k, v)| doc.metadata.get(k) == Some(v));
                if !matches {
                    continue;
                }
            }
            hits.push(SearchHit {
                id: id.clone(),
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
                distance,
                score: 1.0 / (1.0 + distance),
            });
            if hits.len() >= top_k {
                break;
            }
        }
        Ok(hits)
    }

    /// Raw KNN over the HNSW index, ascending cosine distance, with a
    /// linear-scan fallback when no index is built.
    fn knn(&self, query_vector: &[f32], limit: usize) -> Vec<(String, f32)> {
        let index_guard = self.hnsw_index.read();
        let index = match index_guard.as_ref() {
            Some(idx) => idx,
            None => return self.linear_knn(query_vector, limit),
        };

        let query_point = DocPoint {
            id: String::new(),
            vector: query_vector.to_vec(),
        };

        // The index reorders points internally, so a PointId is not an
        // index into the insertion-order vector; each hit carries its own
        // value and distance.
        let mut search = Search::default();
        index
            .hnsw
            .search(&query_point, &mut search)
            .take(limit)
            .map(|candidate| (candidate.value.id.clone(), candidate.distance))
            .collect()
    }

    fn linear_knn(&self, query_vector: &[f32], limit: usize) -> Vec<(String, f32)> {
        let mut results: Vec<(String, f32)> = self
            .vector_cache
            .iter()
            .map(|entry| {
                let distance = 1.0 - cosine_similarity(query_vector, entry.value());
                (entry.key().clone(), distance)
            })
            .collect();

        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        results
    }

    /// BM25-ranked full-text search over document content.
    ///
    /// Ranks are negated BM25 scores in ascending order, and each hit
    /// carries a highlighted snippet of the matching region. Works with no
    /// external capability configured.
    pub fn fulltext_search(&self, query: &str, limit: usize) -> Vec<FtsHit> {
        let scored = self.lexical.read().search(query, limit);
        let query_tokens = Bm25Index::tokenize(query);

        scored
            .into_iter()
            .filter_map(|(id, score)| {
                let doc = self.doc_cache.get(&id)?;
                Some(FtsHit {
                    id: id.clone(),
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                    snippet: make_snippet(&doc.content, &query_tokens),
                    rank: -score,
                })
            })
            .collect()
    }

    /// Number of stored documents
    pub fn count(&self) -> usize {
        self.doc_cache.len()
    }

    /// Document content and metadata by id
    pub fn get(&self, id: &str) -> Option<(String, AttrMap)> {
        self.doc_cache
            .get(id)
            .map(|doc| (doc.content.clone(), doc.metadata.clone()))
    }

    /// Delete a document and its vector. Returns false if absent.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.locks.acquire(LockResource::VectorDb, self.lock_timeout)?;

        let removed = self.doc_cache.remove(id).is_some();
        self.vector_cache.remove(id);

        self.db.delete(format!("{DOC_PREFIX}{id}").as_bytes())?;
        self.db.delete(format!("{VEC_PREFIX}{id}").as_bytes())?;
        self.db.flush()?;

        let all_points = {
            let mut points = self.hnsw_points.write();
            points.retain(|p| p.id != id);
            points.clone()
        };
        self.rebuild_hnsw_index(all_points);
        self.rebuild_lexical();
        Ok(removed)
    }

    fn rebuild_hnsw_index(&self, points: Vec<DocPoint>) {
        if points.is_empty() {
            *self.hnsw_index.write() = None;
            *self.hnsw_points.write() = Vec::new();
            return;
        }

        let hnsw = Builder::default()
            .ef_construction(100)
            .build(points.clone(), points.clone());

        *self.hnsw_points.write() = points;
        *self.hnsw_index.write() = Some(HnswIndex { hnsw });
    }

    /// Rebuild the derived lexical index from the document cache; called
    /// after every mutation so it never drifts from the documents.
    fn rebuild_lexical(&self) {
        let docs: Vec<(String, String)> = self
            .doc_cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().content.clone()))
            .collect();
        *self.lexical.write() = Bm25Index::build(&docs);
    }
}

/// BM25 index over document content
#[derive(Default)]
pub struct Bm25Index {
    /// Inverted index: term -> [(doc_id, term frequency)]
    inverted: HashMap<String, Vec<(String, f32)>>,
    doc_lengths: HashMap<String, f32>,
    avg_doc_length: f32,
    num_docs: usize,
    k1: f32,
    b: f32,
}

impl Bm25Index {
    /// Build the index from (id, content) pairs
    pub fn build(docs: &[(String, String)]) -> Self {
        let mut inverted: HashMap<String, Vec<(String, f32)>> = HashMap::new();
        let mut doc_lengths: HashMap<String, f32> = HashMap::new();
        let mut total_length = 0.0;

        for (id, content) in docs {
            let tokens = Self::tokenize(content);
            let doc_length = tokens.len() as f32;
            doc_lengths.insert(id.clone(), doc_length);
            total_length += doc_length;

            let mut term_freqs: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for (term, freq) in term_freqs {
                inverted.entry(term).or_default().push((id.clone(), freq as f32));
            }
        }

        let num_docs = docs.len();
        let avg_doc_length = if num_docs > 0 {
            total_length / num_docs as f32
        } else {
            0.0
        };

        Self {
            inverted,
            doc_lengths,
            avg_doc_length,
            num_docs,
            k1: 1.2,
            b: 0.75,
        }
    }

    /// Tokenize text into lowercase terms, dropping very short words
    pub fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 2)
            .map(String::from)
            .collect()
    }

    /// Search with BM25 scoring; higher scores first
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let query_tokens = Self::tokenize(query);
        let mut scores: HashMap<String, f32> = HashMap::new();

        for token in &query_tokens {
            if let Some(postings) = self.inverted.get(token) {
                let idf = self.idf(postings.len());
                for (doc_id, tf) in postings {
                    let doc_length = self.doc_lengths.get(doc_id).copied().unwrap_or(1.0);
                    let score = self.bm25_score(*tf, doc_length, idf);
                    *scores.entry(doc_id.clone()).or_insert(0.0) += score;
                }
            }
        }

        let mut results: Vec<_> = scores.into_iter().collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        results
    }

    fn idf(&self, doc_freq: usize) -> f32 {
        let n = self.num_docs as f32;
        let df = doc_freq as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn bm25_score(&self, tf: f32, doc_length: f32, idf: f32) -> f32 {
        let numerator = tf * (self.k1 + 1.0);
        let denominator = tf + self.k1 * (1.0 - self.b + self.b * doc_length / self.avg_doc_length);
        idf * numerator / denominator
    }
}

/// Words shown on either side of the first matching term
const SNIPPET_CONTEXT: usize = 16;

/// Build a highlighted snippet around the first query-term match.
fn make_snippet(content: &str, query_tokens: &[String]) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let matches_query = |word: &str| {
        let normalized = word
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>();
        query_tokens.iter().any(|t| *t == normalized)
    };

    let first = words.iter().position(|w| matches_query(w)).unwrap_or(0);
    let start = first.saturating_sub(SNIPPET_CONTEXT);
    let end = (first + SNIPPET_CONTEXT + 1).min(words.len());

    let mut parts = Vec::with_capacity(end - start + 2);
    if start > 0 {
        parts.push("...".to_string());
    }
    for word in &words[start..end] {
        if matches_query(word) {
            parts.push(format!(">>>{}<<<", word));
        } else {
            parts.push((*word).to_string());
        }
    }
    if end < words.len() {
        parts.push("...".to_string());
    }
    parts.join(" ")
}

/// Cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn open_store(tmp: &TempDir) -> DocumentStore {
        let config = StoreConfig::new(tmp.path()).with_dimension(DIM);
        let locks = Arc::new(LockManager::new(&config));
        DocumentStore::open(&config, locks).unwrap()
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);
    }

    #[test]
    fn test_dimension_guard_rejects_and_leaves_store_unchanged() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);

        let before = store.count();
        let err = store
            .add("d1", "content", &[0.1, 0.2], AttrMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { expected: 4, actual: 2 }
        ));
        assert_eq!(store.count(), before);
        assert!(store.get("d1").is_none());
    }

    #[test]
    fn test_add_get_delete_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);

        let mut meta = AttrMap::new();
        meta.insert("source".into(), "daily_log".into());
        store
            .add("d1", "rust ownership notes", &[1.0, 0.0, 0.0, 0.0], meta)
            .unwrap();
        assert_eq!(store.count(), 1);

        let (content, metadata) = store.get("d1").unwrap();
        assert_eq!(content, "rust ownership notes");
        assert_eq!(metadata["source"], "daily_log".into());

        assert!(store.delete("d1").unwrap());
        assert!(!store.delete("d1").unwrap());
        assert_eq!(store.count(), 0);
        // Deletion also drops the document from the lexical index
        assert!(store.fulltext_search("ownership", 10).is_empty());
    }

    #[test]
    fn test_knn_orders_by_distance_with_score() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);

        store
            .add("near", "near doc", &[1.0, 0.0, 0.0, 0.0], AttrMap::new())
            .unwrap();
        store
            .add("far", "far doc", &[0.0, 1.0, 0.0, 0.0], AttrMap::new())
            .unwrap();

        let hits = store.search(&[1.0, 0.1, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].distance < hits[1].distance);
        assert!(hits[0].score > hits[1].score);
        assert!(hits[0].score <= 1.0 && hits[0].score > 0.0);
    }

    #[test]
    fn test_knn_finds_exact_match_among_many_documents() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);

        // Enough documents that the index builds real layers and its
        // internal point order diverges from insertion order
        for i in 0..40 {
            let angle = i as f32 * std::f32::consts::PI / 80.0;
            store
                .add(
                    &format!("doc{}", i),
                    &format!("entry number {}", i),
                    &[angle.cos(), angle.sin(), 0.0, 0.0],
                    AttrMap::new(),
                )
                .unwrap();
        }

        // Query with doc17's own stored vector: it must come back first
        let angle = 17.0 * std::f32::consts::PI / 80.0;
        let hits = store
            .search(&[angle.cos(), angle.sin(), 0.0, 0.0], 5, None)
            .unwrap();
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].id, "doc17");
        assert!(hits[0].distance < 1e-4);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        // The angular neighbors are next in some order
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&"doc16"));
        assert!(ids.contains(&"doc18"));
    }

    #[test]
    fn test_search_metadata_filter() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);

        let mut log_meta = AttrMap::new();
        log_meta.insert("source".into(), "daily_log".into());
        let mut fact_meta = AttrMap::new();
        fact_meta.insert("source".into(), "fact".into());

        store
            .add("d1", "one", &[1.0, 0.0, 0.0, 0.0], log_meta.clone())
            .unwrap();
        store
            .add("d2", "two", &[0.9, 0.1, 0.0, 0.0], fact_meta)
            .unwrap();

        let hits = store
            .search(&[1.0, 0.0, 0.0, 0.0], 5, Some(&log_meta))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "d1");
    }

    #[test]
    fn test_search_empty_store_is_empty_not_error() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 10, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_rejects_bad_query_dimension() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        let err = store.search(&[1.0, 0.0], 10, None).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_fulltext_ranks_and_snippets() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);

        store
            .add(
                "d1",
                "borrow checker borrow checker borrow checker",
                &[1.0, 0.0, 0.0, 0.0],
                AttrMap::new(),
            )
            .unwrap();
        store
            .add(
                "d2",
                "the borrow checker appeared once in these notes",
                &[0.0, 1.0, 0.0, 0.0],
                AttrMap::new(),
            )
            .unwrap();
        store
            .add("d3", "nothing relevant here", &[0.0, 0.0, 1.0, 0.0], AttrMap::new())
            .unwrap();

        let hits = store.fulltext_search("borrow", 10);
        assert_eq!(hits.len(), 2);
        // Ascending rank: more negative sorts first
        assert!(hits[0].rank < 0.0);
        assert!(hits[0].rank <= hits[1].rank);
        assert_eq!(hits[0].id, "d1");
        assert!(hits[1].snippet.contains(">>>borrow<<<"));
    }

    #[test]
    fn test_update_replaces_lexical_entry() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);

        store
            .add("d1", "about tokio runtimes", &[1.0, 0.0, 0.0, 0.0], AttrMap::new())
            .unwrap();
        store
            .add("d1", "about async executors", &[1.0, 0.0, 0.0, 0.0], AttrMap::new())
            .unwrap();

        assert_eq!(store.count(), 1);
        assert!(store.fulltext_search("tokio", 10).is_empty());
        assert_eq!(store.fulltext_search("executors", 10).len(), 1);
    }

    #[test]
    fn test_reopen_preserves_documents_and_dimension() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::new(tmp.path()).with_dimension(DIM);
        let locks = Arc::new(LockManager::new(&config));
        {
            let store = DocumentStore::open(&config, locks.clone()).unwrap();
            store
                .add("d1", "persisted doc", &[0.5, 0.5, 0.0, 0.0], AttrMap::new())
                .unwrap();
        }

        // Reopen with a different configured dimension: stored one wins
        let config2 = StoreConfig::new(tmp.path()).with_dimension(128);
        let store = DocumentStore::open(&config2, locks).unwrap();
        assert_eq!(store.dimension(), DIM);
        assert_eq!(store.count(), 1);
        let hits = store.search(&[0.5, 0.5, 0.0, 0.0], 1, None).unwrap();
        assert_eq!(hits[0].id, "d1");
        assert_eq!(store.fulltext_search("persisted", 5).len(), 1);
    }

    #[test]
    fn test_bm25_tokenize_drops_short_words() {
        let tokens = Bm25Index::tokenize("Hello, World! This is a test.");
        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"test".to_string()));
        assert!(!tokens.contains(&"is".to_string()));
        assert!(!tokens.contains(&"a".to_string()));
    }

    #[test]
    fn test_snippet_window_is_bounded() {
        let long: String = (0..200).map(|i| format!("word{} ", i)).collect();
        let content = format!("{} needle {}", long, long);
        let snippet = make_snippet(&content, &["needle".to_string()]);
        assert!(snippet.contains(">>>needle<<<"));
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert!(snippet.split_whitespace().count() <= 2 * SNIPPET_CONTEXT + 3);
    }
}
