//! Content-addressed, append-only embedding cache.
//!
//! One cache file per `(source, model)` pair, colocated with the input.
//! Keys are `SHA-256(model_name ‖ "\n" ‖ model_version ‖ "\n" ‖ text)`, so
//! replaying the same text against the same model is always a cache hit
//! regardless of which chunk it came from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::RagResult;
use crate::ndjson;
use crate::types::ModelId;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheLine {
    k: String,
    v: Vec<f32>,
}

/// Computes the content-addressed cache key for `text` under `model`.
pub fn cache_key(model: &ModelId, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.name.as_bytes());
    hasher.update(b"\n");
    hasher.update(model.version.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// An append-only, content-addressed embedding cache backed by an NDJSON
/// file. Cheaply cloneable; the in-memory map is shared behind a mutex so
/// concurrent batches within one process see each other's writes.
#[derive(Clone)]
pub struct EmbeddingCache {
    path: PathBuf,
    entries: Arc<Mutex<HashMap<String, Vec<f32>>>>,
}

impl EmbeddingCache {
    /// The cache file path for an input file and model, per spec:
    /// `<input>.<model>.emb_cache.ndjson`.
    pub fn path_for(input_path: impl AsRef<Path>, model: &ModelId) -> PathBuf {
        let mut name = input_path.as_ref().as_os_str().to_owned();
        name.push(format!(".{}.emb_cache.ndjson", model.name));
        PathBuf::from(name)
    }

    /// Loads an existing cache file, replaying its lines into memory.
    /// Malformed lines are skipped with a warning; duplicate keys resolve
    /// to the last line written (log replay order).
    pub async fn load(path: impl Into<PathBuf>) -> RagResult<Self> {
        let path = path.into();
        let lines: Vec<CacheLine> = ndjson::read_all(&path).await?;
        let mut entries = HashMap::with_capacity(lines.len());
        for line in lines {
            entries.insert(line.k, line.v);
        }
        debug!(path = %path.display(), entries = entries.len(), "loaded embedding cache");
        Ok(Self {
            path,
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.entries.lock().get(key).cloned()
    }

    /// Appends new `(key, vector)` pairs to the on-disk log and to the
    /// in-memory map. Only ever appends: existing lines are never rewritten.
    /// The append itself holds an OS advisory exclusive lock on the cache
    /// file (see `ndjson::append_all`), so two processes writing the same
    /// cache concurrently serialize rather than interleave.
    pub async fn persist_cache_items(&self, items: &[(String, Vec<f32>)]) -> RagResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let lines: Vec<CacheLine> = items
            .iter()
            .map(|(k, v)| CacheLine {
                k: k.clone(),
                v: v.clone(),
            })
            .collect();
        ndjson::append_all(&self.path, &lines).await?;
        let mut entries = self.entries.lock();
        for (k, v) in items {
            entries.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn model() -> ModelId {
        ModelId::new("test-model", "v1")
    }

    #[test]
    fn cache_key_is_stable_for_same_inputs() {
        let m = model();
        assert_eq!(cache_key(&m, "hello"), cache_key(&m, "hello"));
        assert_ne!(cache_key(&m, "hello"), cache_key(&m, "world"));
    }

    #[test]
    fn cache_key_changes_with_model_version() {
        let a = ModelId::new("m", "1");
        let b = ModelId::new("m", "2");
        assert_ne!(cache_key(&a, "text"), cache_key(&b, "text"));
    }

    #[tokio::test]
    async fn persisted_entries_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.md.test-model.emb_cache.ndjson");

        let cache = EmbeddingCache::load(&path).await.unwrap();
        assert!(cache.is_empty());
        cache
            .persist_cache_items(&[("abc".to_string(), vec![1.0, 2.0])])
            .await
            .unwrap();

        let reloaded = EmbeddingCache::load(&path).await.unwrap();
        assert_eq!(reloaded.get("abc"), Some(vec![1.0, 2.0]));
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_keys_resolve_to_last_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.md.test-model.emb_cache.ndjson");

        let cache = EmbeddingCache::load(&path).await.unwrap();
        cache
            .persist_cache_items(&[("k".to_string(), vec![1.0])])
            .await
            .unwrap();
        cache
            .persist_cache_items(&[("k".to_string(), vec![2.0])])
            .await
            .unwrap();

        let reloaded = EmbeddingCache::load(&path).await.unwrap();
        assert_eq!(reloaded.get("k"), Some(vec![2.0]));
    }

    #[test]
    fn path_for_matches_spec_naming() {
        let model = ModelId::new("paraphrase-xlm-r-multilingual-v1", "1");
        let path = EmbeddingCache::path_for("doc.md", &model);
        assert_eq!(
            path,
            PathBuf::from("doc.md.paraphrase-xlm-r-multilingual-v1.emb_cache.ndjson")
        );
    }
}
