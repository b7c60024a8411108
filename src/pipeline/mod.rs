//! Wires the stages together over NDJSON so a crash can be recovered from
//! by re-running later stages against the intermediate files already on
//! disk. Each function here is also what the CLI subcommands call directly
//! — there is no separate "batch mode" vs "CLI mode" path.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::chunking::{ChunkWarning, ChunkerConfig, chunk_markdown};
use crate::embeddings::{EmbeddingCache, EmbeddingService};
use crate::error::{RagError, RagResult};
use crate::keywords::{KeywordExtractorConfig, extract_keywords};
use crate::ndjson;
use crate::rerank::Reranker;
use crate::store::VectorStore;
use crate::types::{Chunk, EmbeddingRecord, ModelId, SearchResult};

fn source_stem(path: &Path) -> RagResult<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::InputMalformed {
            line: 0,
            message: format!("cannot derive a source stem from {}", path.display()),
        })
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Chunks a Markdown file, augments each chunk with keywords, and writes
/// `<path>.chunks.ndjson`. Returns the output path and any budget warnings.
pub async fn run_chunk(
    markdown_path: &Path,
    chunker_config: ChunkerConfig,
    keyword_config: KeywordExtractorConfig,
) -> RagResult<(PathBuf, Vec<ChunkWarning>)> {
    let stem = source_stem(markdown_path)?;
    let markdown = tokio::fs::read_to_string(markdown_path)
        .await
        .map_err(|e| RagError::InputMalformed {
            line: 0,
            message: format!("{}: {e}", markdown_path.display()),
        })?;

    let (mut chunks, warnings) = chunk_markdown(&stem, &markdown, chunker_config);
    for chunk in &mut chunks {
        chunk.keywords = extract_keywords(&chunk.text, keyword_config);
    }
    for warning in &warnings {
        tracing::warn!(
            chunk_index = warning.chunk_index,
            actual_tokens = warning.actual_tokens,
            budget = warning.budget,
            "atomic list block exceeds the token budget"
        );
    }

    let out_path = sibling_with_suffix(markdown_path, ".chunks.ndjson");
    ndjson::write_all(&out_path, &chunks).await?;
    info!(chunks = chunks.len(), path = %out_path.display(), "wrote chunks");
    Ok((out_path, warnings))
}

/// Embeds every chunk in `chunks_path`, consulting/populating the
/// per-`(source, model)` cache, and writes `<path>.embeddings.ndjson`.
pub async fn run_embed(chunks_path: &Path, service: &EmbeddingService) -> RagResult<PathBuf> {
    let chunks: Vec<Chunk> = ndjson::read_all(chunks_path).await?;
    let model = service.model().clone();
    let cache_path = EmbeddingCache::path_for(chunks_path, &model);
    let cache = EmbeddingCache::load(&cache_path).await?;

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = service.encode(&texts, &cache).await?;
    let created_at = chrono::Utc::now();

    let records: Vec<EmbeddingRecord> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, embedding)| EmbeddingRecord {
            chunk,
            embedding,
            model: model.clone(),
            created_at,
        })
        .collect();

    let out_path = sibling_with_suffix(chunks_path, ".embeddings.ndjson");
    ndjson::write_all(&out_path, &records).await?;
    info!(records = records.len(), path = %out_path.display(), "wrote embeddings");
    Ok(out_path)
}

/// Outcome of a vector-store upsert run. A dimension mismatch is fatal for
/// the one record it affects but not for the run: the record is skipped and
/// counted in `skipped` while the rest proceed, per the pipeline's
/// per-record failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertReport {
    pub upserted: usize,
    pub skipped: usize,
}

/// Upserts every record in `embeddings_path` into `collection`, creating it
/// first (dimensionality taken from the first record) if it doesn't exist
/// or `recreate` is set. Records whose embedding length doesn't match the
/// first record's are skipped (`RagError::VectorDimensionMismatch`, logged)
/// rather than aborting the run; the caller uses `skipped` to decide whether
/// the overall run should be reported as a partial failure.
pub async fn run_upsert(
    embeddings_path: &Path,
    store: &dyn VectorStore,
    collection: &str,
    recreate: bool,
) -> RagResult<UpsertReport> {
    let records: Vec<EmbeddingRecord> = ndjson::read_all(embeddings_path).await?;
    let Some(first) = records.first() else {
        return Ok(UpsertReport { upserted: 0, skipped: 0 });
    };
    store.ensure_collection(collection, first.embedding.len(), recreate).await?;

    let mut upserted = 0usize;
    let mut skipped = 0usize;
    for record in &records {
        if record.embedding.len() != first.embedding.len() {
            let err = RagError::VectorDimensionMismatch {
                expected: first.embedding.len(),
                actual: record.embedding.len(),
            };
            tracing::error!(chunk_id = %record.chunk.chunk_id, %err, "skipping record with mismatched embedding dimension");
            skipped += 1;
            continue;
        }
        store.upsert(collection, record).await?;
        upserted += 1;
    }
    info!(upserted, skipped, collection, "upsert complete");
    Ok(UpsertReport { upserted, skipped })
}

/// Embeds `query_text` and returns the `k` nearest chunks in `collection`.
pub async fn run_search(
    query_text: &str,
    service: &EmbeddingService,
    cache: &EmbeddingCache,
    store: &dyn VectorStore,
    collection: &str,
    k: usize,
) -> RagResult<Vec<SearchResult>> {
    let vector = service.encode_one(query_text, cache).await?;
    store.search(collection, &vector, k).await
}

/// Reranks the search results in `results_path` against `query_text` and
/// writes `<path>.reranked.ndjson`.
pub async fn run_rerank(query_text: &str, results_path: &Path, reranker: &Reranker) -> RagResult<PathBuf> {
    let results: Vec<SearchResult> = ndjson::read_all(results_path).await?;
    let ranked = reranker.rerank(query_text, results).await?;
    let out_path = sibling_with_suffix(results_path, ".reranked.ndjson");
    ndjson::write_all(&out_path, &ranked).await?;
    info!(count = ranked.len(), path = %out_path.display(), "wrote reranked results");
    Ok(out_path)
}

pub async fn run_inventory(store: &dyn VectorStore, collection: &str) -> RagResult<crate::store::Inventory> {
    store.inventory(collection).await
}

pub async fn run_purge(store: &dyn VectorStore, collection: &str, source_stem: &str) -> RagResult<usize> {
    store.delete_by_prefix(collection, source_stem).await
}

/// Resolves the model identity used for an embedding run from a `Config`.
pub fn model_from_config(name: &str, version: &str) -> ModelId {
    ModelId::new(name, version)
}
