//! Error taxonomy shared by every stage of the pipeline.
//!
//! Each variant corresponds to one of the failure kinds named in the design
//! (`InputMalformed`, `EmbedBackendUnavailable`, `VectorDimensionMismatch`,
//! ...). Stages propagate `RagError` rather than panicking so a caller can
//! distinguish "this record failed" from "this stage cannot continue".

use thiserror::Error;

/// Whether a backend failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    Transient,
    Permanent,
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("input malformed at line {line}: {message}")]
    InputMalformed { line: usize, message: String },

    #[error("atomic block exceeds token budget ({actual} > {budget}) in chunk {chunk_id}")]
    BudgetExceededByAtomic {
        chunk_id: String,
        actual: usize,
        budget: usize,
    },

    #[error("embedding backend unavailable ({retryability:?}): {message}")]
    EmbedBackendUnavailable {
        retryability: Retryability,
        message: String,
    },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    VectorDimensionMismatch { expected: usize, actual: usize },

    #[error("collection schema conflict: {0}")]
    SchemaConflict(String),

    #[error("collection '{0}' does not exist")]
    CollectionMissing(String),

    #[error("embedding cache entry corrupted: {0}")]
    CacheCorruption(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("permanent network error: {0}")]
    PermanentNetwork(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Serde(err.to_string())
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            RagError::TransientNetwork(err.to_string())
        } else if let Some(status) = err.status() {
            if status.is_server_side_error() || status.as_u16() == 429 {
                RagError::TransientNetwork(err.to_string())
            } else {
                RagError::PermanentNetwork(err.to_string())
            }
        } else {
            RagError::PermanentNetwork(err.to_string())
        }
    }
}

/// Result alias used throughout the crate.
pub type RagResult<T> = Result<T, RagError>;
