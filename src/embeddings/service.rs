//! Batched, cached text embedding.
//!
//! `EmbeddingService` wraps a pluggable [`EmbeddingBackend`] with the
//! batching and cache-then-backend-then-writeback behavior the original
//! pipeline's `create_embeddings.py` implements: inputs are split into
//! batches of at most [`DEFAULT_BATCH_SIZE`], cache hits never reach the
//! backend, and new vectors are appended to the cache before the batch
//! returns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embeddings::cache::{EmbeddingCache, cache_key};
use crate::error::{RagError, RagResult, Retryability};
use crate::types::ModelId;

pub const DEFAULT_BATCH_SIZE: usize = 64;
/// How many batches may be in flight against the backend at once. Cache
/// lookups and writeback stay per-batch; this only overlaps the network
/// calls to backends that tolerate concurrent requests.
const MAX_CONCURRENT_BATCHES: usize = 4;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(600);

/// A backend capable of turning text into vectors. Two configurations are
/// supported (a local stand-in encoder and a hosted HTTP API); both are
/// opaque behind this trait.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn model(&self) -> &ModelId;

    /// Encodes a batch of texts, preserving input order (FIFO).
    async fn encode_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>>;
}

/// Deterministic, dependency-free stand-in for an on-device sentence
/// encoder. Not a real embedding model: it hashes each text into a
/// fixed-length unit vector so the rest of the pipeline (cache, vector
/// store, search) can be exercised end-to-end without downloading model
/// weights. A real local encoder would replace this implementation without
/// changing the trait.
pub struct LocalBackend {
    model: ModelId,
    dimensions: usize,
}

impl LocalBackend {
    pub fn new(dimensions: usize) -> Self {
        Self {
            model: ModelId::new("local-hash-encoder", "1"),
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for LocalBackend {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn encode_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embedding(t, self.dimensions)).collect())
    }
}

fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut vector = vec![0.0f32; dimensions];
    for (i, word) in text.split_whitespace().enumerate() {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        i.hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % dimensions;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[derive(Debug, Serialize)]
struct HostedEncodeRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct HostedEncodeResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Talks to an HTTP embedding backend at `EMBED_BACKEND_URL`.
pub struct HostedBackend {
    model: ModelId,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl HostedBackend {
    pub fn new(model: ModelId, endpoint: impl Into<String>, api_key: Option<String>) -> RagResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_READ_TIMEOUT)
            .build()
            .map_err(RagError::from)?;
        Ok(Self {
            model,
            client,
            endpoint: endpoint.into(),
            api_key,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for HostedBackend {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn encode_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            let mut request = self.client.post(&self.endpoint).json(&HostedEncodeRequest {
                model: &self.model.name,
                input: texts,
            });
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let outcome = async {
                let response = request.send().await?;
                let response = response.error_for_status()?;
                response.json::<HostedEncodeResponse>().await
            }
            .await;

            match outcome {
                Ok(body) => return Ok(body.embeddings),
                Err(err) => {
                    let err = RagError::from(err);
                    let retryable = matches!(
                        &err,
                        RagError::TransientNetwork(_)
                    );
                    attempt += 1;
                    if !retryable || attempt > self.max_retries {
                        return Err(RagError::EmbedBackendUnavailable {
                            retryability: if retryable {
                                Retryability::Transient
                            } else {
                                Retryability::Permanent
                            },
                            message: err.to_string(),
                        });
                    }
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt.min(6)));
                    warn!(attempt, ?backoff, "embedding backend call failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Batches, caches, and dispatches embedding requests.
pub struct EmbeddingService {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
}

impl EmbeddingService {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn model(&self) -> &ModelId {
        self.backend.model()
    }

    /// Encodes `texts`, consulting `cache` first and writing back any
    /// misses before each batch returns. Output order matches input order.
    pub async fn encode(&self, texts: &[String], cache: &EmbeddingCache) -> RagResult<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let model = self.backend.model().clone();

        let batch_starts: Vec<usize> = (0..texts.len()).step_by(self.batch_size).collect();
        let batch_results = stream::iter(batch_starts)
            .map(|batch_start| {
                let batch_end = (batch_start + self.batch_size).min(texts.len());
                let batch = &texts[batch_start..batch_end];
                self.encode_batch_with_cache(batch_start, batch, &model, cache)
            })
            .buffer_unordered(MAX_CONCURRENT_BATCHES)
            .collect::<Vec<RagResult<Vec<(usize, Vec<f32>)>>>>()
            .await;

        for batch_result in batch_results {
            for (idx, vector) in batch_result? {
                results[idx] = Some(vector);
            }
        }

        info!(count = texts.len(), "embedding batch complete");
        Ok(results.into_iter().map(|v| v.expect("every index filled")).collect())
    }

    async fn encode_batch_with_cache(
        &self,
        batch_start: usize,
        batch: &[String],
        model: &ModelId,
        cache: &EmbeddingCache,
    ) -> RagResult<Vec<(usize, Vec<f32>)>> {
        let mut hits: Vec<(usize, Vec<f32>)> = Vec::new();
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();
        let mut miss_keys = Vec::new();
        for (offset, text) in batch.iter().enumerate() {
            let key = cache_key(model, text);
            if let Some(vector) = cache.get(&key) {
                hits.push((batch_start + offset, vector));
            } else {
                miss_indices.push(batch_start + offset);
                miss_texts.push(text.clone());
                miss_keys.push(key);
            }
        }

        debug!(
            batch_len = batch.len(),
            hits = hits.len(),
            misses = miss_texts.len(),
            "encoding batch"
        );

        if miss_texts.is_empty() {
            return Ok(hits);
        }

        let vectors = self.backend.encode_batch(&miss_texts).await?;
        if vectors.len() != miss_texts.len() {
            return Err(RagError::Other(format!(
                "embedding backend returned {} vectors for {} inputs",
                vectors.len(),
                miss_texts.len()
            )));
        }
        let new_entries: Vec<(String, Vec<f32>)> = miss_keys.into_iter().zip(vectors.iter().cloned()).collect();
        cache.persist_cache_items(&new_entries).await?;

        hits.extend(miss_indices.into_iter().zip(vectors.into_iter()));
        Ok(hits)
    }

    pub async fn encode_one(&self, text: &str, cache: &EmbeddingCache) -> RagResult<Vec<f32>> {
        let mut vectors = self.encode(std::slice::from_ref(&text.to_string()), cache).await?;
        Ok(vectors.remove(0))
    }
}
