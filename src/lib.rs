//! Persistent long-term memory for AI agents
//!
//! An embedded store combining four cooperating layers over one on-disk
//! root directory:
//!
//! - [`LockManager`]: advisory file locks over a closed set of logical
//!   resources, so multiple agent processes can share the store safely
//! - [`MemoryIndexer`]: incremental header index over the markdown
//!   memory-log tree, rebuilt only for files whose mtime changed
//! - [`GraphStore`]: a directed knowledge graph of typed entities and
//!   predicate-labelled relations, persisted as a JSON snapshot
//! - [`DocumentStore`]: RocksDB-backed documents with fixed-dimension
//!   embedding vectors (HNSW KNN) and a derived BM25 lexical index
//!
//! Embedding and re-ranking are external capabilities behind the
//! [`EmbeddingProvider`] and [`Reranker`] traits; [`hybrid_search`]
//! composes them with the document store and degrades to lexical-only
//! retrieval when no provider is available.
//!
//! ```no_run
//! use agent_memstore::{DocumentStore, LockManager, StoreConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> agent_memstore::Result<()> {
//! let config = StoreConfig::new("/data/agent").with_dimension(4);
//! config.initialize()?;
//! let locks = Arc::new(LockManager::new(&config));
//! let store = DocumentStore::open(&config, locks)?;
//! store.add("note-1", "prefers explicit error types", &[0.1, 0.2, 0.3, 0.4], Default::default())?;
//! let hits = store.fulltext_search("error types", 5);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod lock;
pub mod search;
pub mod store;
pub mod value;

pub use config::{append_daily_log, StoreConfig, DEFAULT_DIMENSION};
pub use embedding::{EmbeddingProvider, NoEmbedding, NoReranker, RerankScore, Reranker};
pub use error::{Result, StoreError};
pub use graph::{
    normalize_entity_id, Direction, Entity, GraphStats, GraphStore, RelationAttrs, Triple,
};
pub use indexer::{BuildReport, IndexEntry, MemoryIndex, MemoryIndexer, INDEX_VERSION};
pub use lock::{LockGuard, LockManager, LockResource, DEFAULT_LOCK_TIMEOUT};
pub use search::hybrid_search;
pub use store::{Document, DocumentStore, FtsHit, SearchHit};
pub use value::{AttrMap, AttrValue};
