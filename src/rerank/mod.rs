//! Cross-encoder reranking of retrieved chunks against a query.
//!
//! Scores each `(query, chunk.text)` pair, truncating only on the model
//! side (the stored text is never truncated), then sorts descending by
//! score. Ties keep the original retrieval order, following the original
//! pipeline's reliance on a stable sort.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RagError, RagResult};
use crate::types::SearchResult;

pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const MAX_MODEL_TOKENS: usize = 512;

/// A backend able to score `(query, text)` pairs. The score is monotone in
/// relevance but not calibrated across queries or models — callers must
/// never compare scores between different queries.
#[async_trait]
pub trait EncoderBackend: Send + Sync {
    async fn score_batch(&self, query: &str, texts: &[String]) -> RagResult<Vec<f32>>;
}

fn truncate_to_model_tokens(text: &str) -> String {
    text.split_whitespace()
        .take(MAX_MODEL_TOKENS)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Serialize)]
struct HostedScoreRequest<'a> {
    model: &'a str,
    query: &'a str,
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct HostedScoreResponse {
    scores: Vec<f32>,
}

/// Scores pairs against an HTTP cross-encoder endpoint named by
/// `CROSS_ENCODER_MODEL`.
pub struct HostedCrossEncoder {
    client: reqwest::Client,
    endpoint: String,
    model_name: String,
}

impl HostedCrossEncoder {
    pub fn new(endpoint: impl Into<String>, model_name: impl Into<String>) -> RagResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(RagError::from)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model_name: model_name.into(),
        })
    }
}

#[async_trait]
impl EncoderBackend for HostedCrossEncoder {
    async fn score_batch(&self, query: &str, texts: &[String]) -> RagResult<Vec<f32>> {
        let truncated: Vec<String> = texts.iter().map(|t| truncate_to_model_tokens(t)).collect();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&HostedScoreRequest {
                model: &self.model_name,
                query,
                texts: &truncated,
            })
            .send()
            .await?
            .error_for_status()
            .map_err(RagError::from)?;
        let body: HostedScoreResponse = response.json().await?;
        Ok(body.scores)
    }
}

/// Deterministic lexical-overlap scorer, used when no hosted cross-encoder
/// is configured. Not a real cross-encoder: it scores by the fraction of
/// query tokens present in the candidate text, as a placeholder for an
/// on-device model.
pub struct LexicalOverlapEncoder;

#[async_trait]
impl EncoderBackend for LexicalOverlapEncoder {
    async fn score_batch(&self, query: &str, texts: &[String]) -> RagResult<Vec<f32>> {
        let query_tokens: Vec<String> = query.split_whitespace().map(|w| w.to_lowercase()).collect();
        if query_tokens.is_empty() {
            return Ok(vec![0.0; texts.len()]);
        }
        Ok(texts
            .iter()
            .map(|text| {
                let truncated = truncate_to_model_tokens(text).to_lowercase();
                let hits = query_tokens.iter().filter(|qt| truncated.contains(qt.as_str())).count();
                hits as f32 / query_tokens.len() as f32
            })
            .collect())
    }
}

/// Reranks `(query, chunk)` pairs with a cross-encoder, batching internally.
pub struct Reranker {
    backend: Arc<dyn EncoderBackend>,
    batch_size: usize,
}

impl Reranker {
    pub fn new(backend: Arc<dyn EncoderBackend>) -> Self {
        Self {
            backend,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Scores and sorts `results` for `query`, descending by score. Ties
    /// preserve the input order (a stable sort over the original index).
    pub async fn rerank(&self, query: &str, mut results: Vec<SearchResult>) -> RagResult<Vec<SearchResult>> {
        let texts: Vec<String> = results.iter().map(|r| r.chunk.text.clone()).collect();
        let mut scores = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            debug!(batch_len = batch.len(), "scoring rerank batch");
            let batch_scores = self.backend.score_batch(query, batch).await?;
            if batch_scores.len() != batch.len() {
                return Err(RagError::Other(format!(
                    "reranker returned {} scores for {} inputs",
                    batch_scores.len(),
                    batch.len()
                )));
            }
            scores.extend(batch_scores);
        }

        for (result, score) in results.iter_mut().zip(scores.iter()) {
            result.reranker = Some(*score);
        }

        let mut indexed: Vec<(usize, SearchResult)> = results.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            b.reranker
                .partial_cmp(&a.reranker)
                .unwrap()
                .then_with(|| ia.cmp(ib))
        });
        results = indexed.into_iter().map(|(_, r)| r).collect();

        Ok(results)
    }
}
