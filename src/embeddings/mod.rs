//! Batched text embedding with a persistent content-addressed cache.

pub mod cache;
pub mod service;

pub use cache::{EmbeddingCache, cache_key};
pub use service::{DEFAULT_BATCH_SIZE, EmbeddingBackend, EmbeddingService, HostedBackend, LocalBackend};
