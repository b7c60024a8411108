//! Weaviate REST backend for [`VectorStore`].
//!
//! Mirrors the original pipeline's schema and query shape (a single
//! `"text"` named vector, vectorization disabled, HNSW/cosine index,
//! `near_vector` search, cursor-paginated `fetch_objects` for inventory and
//! purge) against the plain REST/GraphQL surface instead of a client SDK.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{RagError, RagResult};
use crate::store::{Inventory, VectorStore};
use crate::types::{Chunk, EmbeddingRecord, HeadingMap, SearchResult};

const PAGE_SIZE: usize = 1000;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

static CHUNK_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?P<file>.+)-(?P<index>\d+)$").unwrap());

/// Talks to a Weaviate instance's REST (`/v1/schema`, `/v1/objects`) and
/// GraphQL (`/v1/graphql`) endpoints.
pub struct WeaviateStore {
    client: reqwest::Client,
    base_url: String,
}

impl WeaviateStore {
    pub fn new(base_url: impl Into<String>) -> RagResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(RagError::from)?;
        let mut base_url = base_url.into();
        if base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn heading_properties(map: &HeadingMap) -> Option<Value> {
        if map.is_empty() {
            return None;
        }
        let mut obj = serde_json::Map::new();
        for (level, title) in map {
            obj.insert(format!("h{level}"), Value::String(title.clone()));
        }
        Some(Value::Object(obj))
    }

    fn chunk_properties(chunk: &Chunk, created_at: &str) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("chunk_id".into(), Value::String(chunk.chunk_id.clone()));
        props.insert("text".into(), Value::String(chunk.text.clone()));
        props.insert("approx_tokens".into(), Value::from(chunk.approx_tokens));
        props.insert(
            "keywords".into(),
            Value::Array(chunk.keywords.iter().cloned().map(Value::String).collect()),
        );
        props.insert("created_at".into(), Value::String(created_at.to_string()));
        if let Some(headings) = Self::heading_properties(&chunk.headings) {
            props.insert("headings".into(), headings);
        }
        if let Some(heading) = Self::heading_properties(&chunk.heading) {
            props.insert("heading".into(), heading);
        }
        if !chunk.full_headings.is_empty() {
            props.insert("full_headings".into(), Value::String(chunk.full_headings.clone()));
        }
        Value::Object(props)
    }
}

/// Derives a stable, valid-looking UUID from a `chunk_id` so repeated
/// upserts of the same chunk replace the same object instead of
/// accumulating duplicates.
fn deterministic_object_id(chunk_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"ragsmith.weaviate.object-id.v1\n");
    hasher.update(chunk_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x50; // version 5-shaped
    bytes[8] = (bytes[8] & 0x3f) | 0x80; // RFC 4122 variant
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0],
        bytes[1],
        bytes[2],
        bytes[3],
        bytes[4],
        bytes[5],
        bytes[6],
        bytes[7],
        bytes[8],
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15],
    )
}

fn heading_nested_properties() -> Vec<Value> {
    (1..=6)
        .map(|n| json!({ "name": format!("h{n}"), "dataType": ["text"] }))
        .collect()
}

#[async_trait]
impl VectorStore for WeaviateStore {
    async fn ensure_collection(&self, name: &str, dimensions: usize, recreate: bool) -> RagResult<()> {
        if recreate {
            let resp = self.client.delete(self.url(&format!("/v1/schema/{name}"))).send().await?;
            if resp.status() != StatusCode::NOT_FOUND {
                resp.error_for_status().map_err(RagError::from)?;
            }
        } else {
            let existing = self.client.get(self.url(&format!("/v1/schema/{name}"))).send().await?;
            if existing.status() == StatusCode::OK {
                debug!(collection = name, "collection already exists, leaving schema in place");
                return Ok(());
            }
            if existing.status() != StatusCode::NOT_FOUND {
                existing.error_for_status().map_err(RagError::from)?;
            }
        }

        let class_def = json!({
            "class": name,
            "vectorConfig": {
                "text": {
                    "vectorizer": { "none": {} },
                    "vectorIndexType": "hnsw",
                    "vectorIndexConfig": { "distance": "cosine", "dimensions": dimensions },
                }
            },
            "properties": [
                { "name": "chunk_id", "dataType": ["text"] },
                { "name": "text", "dataType": ["text"] },
                { "name": "approx_tokens", "dataType": ["int"] },
                { "name": "keywords", "dataType": ["text[]"] },
                { "name": "created_at", "dataType": ["text"] },
                { "name": "model", "dataType": ["object"], "nestedProperties": [
                    { "name": "name", "dataType": ["text"] },
                    { "name": "version", "dataType": ["text"] },
                ] },
                { "name": "headings", "dataType": ["object"], "nestedProperties": heading_nested_properties() },
                { "name": "heading", "dataType": ["object"], "nestedProperties": heading_nested_properties() },
                { "name": "full_headings", "dataType": ["text"] },
            ],
        });

        let response = self.client.post(self.url("/v1/schema")).json(&class_def).send().await?;
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(RagError::SchemaConflict(format!(
                "collection '{name}' exists with an incompatible schema; pass recreate=true"
            )));
        }
        response.error_for_status().map_err(RagError::from)?;
        Ok(())
    }

    async fn upsert(&self, name: &str, record: &EmbeddingRecord) -> RagResult<()> {
        let id = deterministic_object_id(&record.chunk.chunk_id);
        let created_at = record.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let mut properties = Self::chunk_properties(&record.chunk, &created_at);
        properties
            .as_object_mut()
            .expect("object built above")
            .insert(
                "model".into(),
                json!({ "name": record.model.name, "version": record.model.version }),
            );

        let body = json!({
            "class": name,
            "id": id,
            "properties": properties,
            "vectors": { "text": record.embedding },
        });

        let response = self.client.put(self.url(&format!("/v1/objects/{id}"))).json(&body).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            let create = self.client.post(self.url("/v1/objects")).json(&body).send().await?;
            create.error_for_status().map_err(RagError::from)?;
            return Ok(());
        }
        response.error_for_status().map_err(RagError::from)?;
        Ok(())
    }

    async fn search(&self, name: &str, query_vector: &[f32], k: usize) -> RagResult<Vec<SearchResult>> {
        let query = format!(
            r#"{{ Get {{ {name}(nearVector: {{ vector: {vector}, targetVectors: ["text"] }}, limit: {k}) {{
                chunk_id text approx_tokens keywords created_at full_headings
                headings {{ h1 h2 h3 h4 h5 h6 }}
                heading {{ h1 h2 h3 h4 h5 h6 }}
                _additional {{ distance }}
            }} }} }}"#,
            vector = serde_json::to_string(query_vector).map_err(RagError::from)?,
        );

        let response = self
            .client
            .post(self.url("/v1/graphql"))
            .json(&json!({ "query": query }))
            .send()
            .await?
            .error_for_status()
            .map_err(RagError::from)?;
        let body: Value = response.json().await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(RagError::CollectionMissing(name.to_string()));
            }
        }

        let objects = body
            .pointer(&format!("/data/Get/{name}"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(objects.len());
        for obj in objects {
            results.push(search_result_from_graphql(&obj)?);
        }
        Ok(results)
    }

    async fn delete_by_prefix(&self, name: &str, stem: &str) -> RagResult<usize> {
        let pattern = Regex::new(&format!("^{}-(\\d+)$", regex::escape(stem))).expect("valid regex");
        let mut deleted = 0usize;
        let mut after: Option<String> = None;

        loop {
            let objects = self.fetch_objects_page(name, after.as_deref()).await?;
            if objects.is_empty() {
                break;
            }
            let page_len = objects.len();
            let mut next_cursor = None;
            for obj in &objects {
                next_cursor = obj.get("id").and_then(Value::as_str).map(str::to_string);
                let chunk_id = obj
                    .pointer("/properties/chunk_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !pattern.is_match(chunk_id) {
                    continue;
                }
                let Some(id) = obj.get("id").and_then(Value::as_str) else {
                    continue;
                };
                match self.client.delete(self.url(&format!("/v1/objects/{id}"))).send().await {
                    Ok(resp) if resp.status().is_success() => deleted += 1,
                    Ok(resp) => warn!(%id, status = %resp.status(), "failed to delete object, continuing"),
                    Err(err) => warn!(%id, %err, "failed to delete object, continuing"),
                }
            }
            if page_len < PAGE_SIZE {
                break;
            }
            after = next_cursor;
        }

        Ok(deleted)
    }

    async fn inventory(&self, name: &str) -> RagResult<Inventory> {
        let mut total = 0usize;
        let mut per_source: BTreeMap<String, usize> = BTreeMap::new();
        let mut after: Option<String> = None;

        loop {
            let objects = self.fetch_objects_page(name, after.as_deref()).await?;
            if objects.is_empty() {
                break;
            }
            let page_len = objects.len();
            let mut next_cursor = None;
            for obj in &objects {
                next_cursor = obj.get("id").and_then(Value::as_str).map(str::to_string);
                total += 1;
                if let Some(chunk_id) = obj.pointer("/properties/chunk_id").and_then(Value::as_str) {
                    if let Some(caps) = CHUNK_ID_RE.captures(chunk_id) {
                        *per_source.entry(caps["file"].to_string()).or_insert(0) += 1;
                    }
                }
            }
            if page_len < PAGE_SIZE {
                break;
            }
            after = next_cursor;
        }

        Ok(Inventory { total, per_source })
    }
}

impl WeaviateStore {
    async fn fetch_objects_page(&self, name: &str, after: Option<&str>) -> RagResult<Vec<Value>> {
        let mut request = self
            .client
            .get(self.url("/v1/objects"))
            .query(&[("class", name.to_string()), ("limit", PAGE_SIZE.to_string())]);
        if let Some(after) = after {
            request = request.query(&[("after", after.to_string())]);
        }
        let response = request.send().await?.error_for_status().map_err(RagError::from)?;
        let body: Value = response.json().await?;
        Ok(body
            .get("objects")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

fn search_result_from_graphql(obj: &Value) -> RagResult<SearchResult> {
    let chunk_id = obj
        .get("chunk_id")
        .and_then(Value::as_str)
        .ok_or_else(|| RagError::Other("search result missing chunk_id".into()))?
        .to_string();
    let text = obj.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
    let approx_tokens = obj.get("approx_tokens").and_then(Value::as_u64).unwrap_or(0) as usize;
    let keywords = obj
        .get("keywords")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let created_at_str = obj.get("created_at").and_then(Value::as_str).unwrap_or_default();
    let created_at = chrono::DateTime::parse_from_rfc3339(created_at_str)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now());
    let full_headings = obj.get("full_headings").and_then(Value::as_str).unwrap_or_default().to_string();
    let headings = parse_heading_object(obj.get("headings"));
    let heading = parse_heading_object(obj.get("heading"));
    let distance = obj
        .pointer("/_additional/distance")
        .and_then(Value::as_f64)
        .unwrap_or(0.0) as f32;
    let source = chunk_id.rsplit_once('-').map(|(stem, _)| stem.to_string()).unwrap_or_default();

    Ok(SearchResult {
        chunk: Chunk {
            chunk_id,
            text,
            headings,
            heading,
            full_headings,
            keywords,
            approx_tokens,
            source,
        },
        distance,
        created_at,
        reranker: None,
    })
}

fn parse_heading_object(value: Option<&Value>) -> HeadingMap {
    let mut map = HeadingMap::new();
    let Some(obj) = value.and_then(Value::as_object) else {
        return map;
    };
    for level in 1..=6u8 {
        if let Some(title) = obj.get(&format!("h{level}")).and_then(Value::as_str) {
            if !title.is_empty() {
                map.insert(level, title.to_string());
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_ids_are_stable_and_unique() {
        let a = deterministic_object_id("doc-1");
        let b = deterministic_object_id("doc-1");
        let c = deterministic_object_id("doc-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn heading_properties_omits_empty_maps() {
        assert!(WeaviateStore::heading_properties(&HeadingMap::new()).is_none());
        let mut map = HeadingMap::new();
        map.insert(1, "Intro".to_string());
        assert!(WeaviateStore::heading_properties(&map).is_some());
    }

    #[test]
    fn chunk_id_regex_splits_stem_and_index() {
        let caps = CHUNK_ID_RE.captures("my-doc-12").unwrap();
        assert_eq!(&caps["file"], "my-doc");
        assert_eq!(&caps["index"], "12");
    }
}
