//! Vector store: a named-vector collection with create/reset, upsert,
//! search, delete-by-prefix, and inventory operations.

pub mod weaviate;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::RagResult;
use crate::types::{EmbeddingRecord, SearchResult};

pub use weaviate::WeaviateStore;

/// Total and per-source-stem object counts for a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    pub total: usize,
    pub per_source: BTreeMap<String, usize>,
}

/// A persistent nearest-neighbor index over named vectors with metadata.
///
/// Implementations serialize upserts per `chunk_id` (the primary key) but
/// must let `search` proceed lock-free against concurrent upserts.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates `name` with vectorization disabled and an HNSW `"text"`
    /// vector of `dimensions` width. If `recreate`, any existing collection
    /// with that name is dropped first; otherwise an existing collection is
    /// left in place (and checked for schema compatibility).
    async fn ensure_collection(&self, name: &str, dimensions: usize, recreate: bool) -> RagResult<()>;

    /// Inserts or replaces `record` by `chunk_id`.
    async fn upsert(&self, name: &str, record: &EmbeddingRecord) -> RagResult<()>;

    /// Returns the `k` nearest objects to `query_vector` on the `"text"`
    /// vector, ordered by ascending cosine distance.
    async fn search(&self, name: &str, query_vector: &[f32], k: usize) -> RagResult<Vec<SearchResult>>;

    /// Removes every object whose `chunk_id` matches `"<stem>-<digits>"`,
    /// returning the number deleted.
    async fn delete_by_prefix(&self, name: &str, stem: &str) -> RagResult<usize>;

    /// Total object count and per-source-stem breakdown.
    async fn inventory(&self, name: &str) -> RagResult<Inventory>;
}
