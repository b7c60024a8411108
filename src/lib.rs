//! Ingestion and retrieval engine for RAG over heterogeneous office
//! documents.
//!
//! ```text
//! Markdown text ──► chunking ──► chunks (NDJSON)
//!                                    │
//!                                    ├─► keywords augments each chunk
//!                                    ├─► embeddings assigns a vector
//!                                    └─► store::VectorStore.upsert
//!
//! query text ──► embeddings.encode_one ──► store.search(k) ──► rerank ──► ordered chunks
//! ```
//!
//! [`pipeline`] wires these stages together over NDJSON so a run can be
//! resumed by re-invoking a later stage against the intermediate files
//! already on disk.

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod keywords;
pub mod ndjson;
pub mod pipeline;
pub mod rerank;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{RagError, RagResult};
pub use types::{Chunk, EmbeddingRecord, ModelId, SearchResult};
