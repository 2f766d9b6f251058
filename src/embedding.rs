//! Embedding and re-rank capability seams
//!
//! The store never talks to a model service itself; callers hand in
//! whatever implementation they have. Unavailability (no provider
//! configured, service down) is distinct from transport failure: the
//! former degrades retrieval gracefully, the latter surfaces as an error.

use crate::error::{Result, StoreError};

/// Relevance judgement for one candidate passage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankScore {
    /// Position of the passage in the candidate slice handed to
    /// [`Reranker::rerank`]
    pub index: usize,
    pub relevance: f32,
}

/// Text-to-vector capability
pub trait EmbeddingProvider: Send + Sync {
    /// Whether the provider can currently serve requests. Callers check
    /// this before embedding and fall back to lexical retrieval when false.
    fn available(&self) -> bool;

    /// Embed one text into a fixed-dimension vector
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Query-relative passage scoring capability
pub trait Reranker: Send + Sync {
    fn available(&self) -> bool;

    /// Score each passage against the query. Implementations may return
    /// the scores in any order; callers sort by relevance.
    fn rerank(&self, query: &str, passages: &[&str]) -> Result<Vec<RerankScore>>;
}

/// Placeholder provider for deployments without an embedding service
#[derive(Debug, Default)]
pub struct NoEmbedding;

impl EmbeddingProvider for NoEmbedding {
    fn available(&self) -> bool {
        false
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(StoreError::unavailable("no embedding provider configured"))
    }
}

/// Placeholder reranker for deployments without a re-rank service
#[derive(Debug, Default)]
pub struct NoReranker;

impl Reranker for NoReranker {
    fn available(&self) -> bool {
        false
    }

    fn rerank(&self, _query: &str, _passages: &[&str]) -> Result<Vec<RerankScore>> {
        Err(StoreError::unavailable("no reranker configured"))
    }
}
