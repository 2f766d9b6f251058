//! Hybrid retrieval composition
//!
//! Glue between the document store and the external capabilities: embed
//! the query, over-fetch a candidate pool by vector distance, then let a
//! reranker reorder the pool before truncating to the requested size.

use crate::embedding::{EmbeddingProvider, Reranker};
use crate::error::Result;
use crate::store::{DocumentStore, SearchHit};

/// Semantic search with optional re-rank refinement.
///
/// With no usable embedding provider this returns an empty list rather
/// than an error, so callers can fall back to
/// [`DocumentStore::fulltext_search`]. A reranker is consulted only when
/// it is available and the candidate pool is actually larger than
/// `top_n`; re-rank transport failures propagate.
pub fn hybrid_search(
    store: &DocumentStore,
    embedder: &dyn EmbeddingProvider,
    reranker: Option<&dyn Reranker>,
    query: &str,
    pool_size: usize,
    top_n: usize,
) -> Result<Vec<SearchHit>> {
    if !embedder.available() {
        log::debug!("embedding provider unavailable, skipping semantic search");
        return Ok(Vec::new());
    }

    let query_embedding = embedder.embed(query)?;
    let mut pool = store.search(&query_embedding, pool_size.max(top_n), None)?;

    if let Some(reranker) = reranker.filter(|r| r.available()) {
        if pool.len() > top_n {
            pool = rerank_pool(reranker, query, pool)?;
        }
    }

    pool.truncate(top_n);
    Ok(pool)
}

/// Reorder candidates by reranker relevance, descending. Scores that
/// reference positions outside the pool are ignored.
fn rerank_pool(
    reranker: &dyn Reranker,
    query: &str,
    pool: Vec<SearchHit>,
) -> Result<Vec<SearchHit>> {
    let passages: Vec<&str> = pool.iter().map(|hit| hit.content.as_str()).collect();
    let mut scores = reranker.rerank(query, &passages)?;
    scores.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut taken = vec![false; pool.len()];
    let mut pool: Vec<Option<SearchHit>> = pool.into_iter().map(Some).collect();
    let mut reordered = Vec::with_capacity(pool.len());
    for score in scores {
        if let Some(slot) = pool.get_mut(score.index) {
            if !taken[score.index] {
                taken[score.index] = true;
                if let Some(hit) = slot.take() {
                    reordered.push(hit);
                }
            }
        }
    }
    // Candidates the reranker never mentioned keep their vector order
    for slot in pool {
        if let Some(hit) = slot {
            reordered.push(hit);
        }
    }
    Ok(reordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::embedding::{NoEmbedding, RerankScore};
    use crate::error::StoreError;
    use crate::lock::LockManager;
    use crate::value::AttrMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    const DIM: usize = 4;

    struct StubEmbedder {
        vector: Vec<f32>,
    }

    impl EmbeddingProvider for StubEmbedder {
        fn available(&self) -> bool {
            true
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.vector.clone())
        }
    }

    /// Reverses the candidate order by scoring later positions higher
    struct ReversingReranker;

    impl Reranker for ReversingReranker {
        fn available(&self) -> bool {
            true
        }

        fn rerank(&self, _query: &str, passages: &[&str]) -> Result<Vec<RerankScore>> {
            Ok((0..passages.len())
                .map(|index| RerankScore {
                    index,
                    relevance: index as f32,
                })
                .collect())
        }
    }

    struct BrokenReranker;

    impl Reranker for BrokenReranker {
        fn available(&self) -> bool {
            true
        }

        fn rerank(&self, _query: &str, _passages: &[&str]) -> Result<Vec<RerankScore>> {
            Err(StoreError::transport("rerank endpoint refused connection"))
        }
    }

    fn store_with_docs(tmp: &TempDir, n: usize) -> DocumentStore {
        let config = StoreConfig::new(tmp.path()).with_dimension(DIM);
        let locks = Arc::new(LockManager::new(&config));
        let store = DocumentStore::open(&config, locks).unwrap();
        for i in 0..n {
            // Increasing angle from the x axis: doc0 is nearest to [1,0,0,0]
            let t = i as f32 / n as f32;
            store
                .add(
                    &format!("doc{}", i),
                    &format!("document number {}", i),
                    &[1.0 - t, t, 0.0, 0.0],
                    AttrMap::new(),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_unavailable_embedder_yields_empty_not_error() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_docs(&tmp, 3);

        let hits = hybrid_search(&store, &NoEmbedding, None, "anything", 10, 5).unwrap();
        assert!(hits.is_empty());
        // Lexical retrieval still works without the capability
        assert_eq!(store.fulltext_search("document", 10).len(), 3);
    }

    #[test]
    fn test_vector_only_returns_nearest() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_docs(&tmp, 10);
        let embedder = StubEmbedder {
            vector: vec![1.0, 0.0, 0.0, 0.0],
        };

        let hits = hybrid_search(&store, &embedder, None, "q", 10, 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "doc0");
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);
    }

    #[test]
    fn test_reranker_reorders_pool_before_truncation() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_docs(&tmp, 10);
        let embedder = StubEmbedder {
            vector: vec![1.0, 0.0, 0.0, 0.0],
        };

        let hits =
            hybrid_search(&store, &embedder, Some(&ReversingReranker), "q", 10, 5).unwrap();
        assert_eq!(hits.len(), 5);
        // The reranker scores the farthest pool members highest, so the
        // result is the tail of the vector ordering, reversed
        assert_eq!(hits[0].id, "doc9");
        assert_eq!(hits[1].id, "doc8");
        assert_eq!(hits[4].id, "doc5");
    }

    #[test]
    fn test_reranker_skipped_when_pool_fits() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_docs(&tmp, 3);
        let embedder = StubEmbedder {
            vector: vec![1.0, 0.0, 0.0, 0.0],
        };

        // Pool of 3 <= top_n of 5: vector order is kept even though the
        // reranker would have reversed it
        let hits =
            hybrid_search(&store, &embedder, Some(&ReversingReranker), "q", 3, 5).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "doc0");
    }

    #[test]
    fn test_rerank_transport_error_propagates() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_docs(&tmp, 10);
        let embedder = StubEmbedder {
            vector: vec![1.0, 0.0, 0.0, 0.0],
        };

        let err = hybrid_search(&store, &embedder, Some(&BrokenReranker), "q", 10, 5)
            .unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}
