//! Markdown chunking: turns a document into heading-bounded, list-atomic
//! chunks under a token budget.

pub mod markdown;
pub mod tokens;

pub use markdown::{ChunkWarning, ChunkerConfig, DEFAULT_CHUNK_SIZE_TOKENS, chunk_markdown};
pub use tokens::estimate_tokens;
