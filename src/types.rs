//! The data model shared by every stage: [`Chunk`], [`EmbeddingRecord`], and
//! the small value types that travel between them over NDJSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ordered heading levels, 1..=6. Only levels active at a chunk's position
/// are present — this is a snapshot copied at emission time, never a shared
/// mutable map with back references (see design notes on the chunk/heading
/// relation).
pub type HeadingMap = BTreeMap<u8, String>;

/// Identifies the embedding or cross-encoder model that produced a vector or
/// score, forming part of the embedding cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelId {
    pub name: String,
    pub version: String,
}

impl ModelId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// The unit of retrieval. Produced once per ingestion and immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    /// Omitted from serialized output entirely when empty, matching the
    /// vector store's rule that object fields are absent rather than
    /// empty containers (spec §9).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub headings: HeadingMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub heading: HeadingMap,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub full_headings: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub approx_tokens: usize,
    pub source: String,
}

impl Chunk {
    /// Builds the `full_headings` path from `headings`, top level first.
    pub fn full_headings_path(headings: &HeadingMap) -> String {
        headings
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join(" > ")
    }

    /// The single deepest active heading, or an empty map.
    pub fn deepest_heading(headings: &HeadingMap) -> HeadingMap {
        match headings.keys().next_back() {
            Some(level) => {
                let mut map = HeadingMap::new();
                map.insert(*level, headings[level].clone());
                map
            }
            None => HeadingMap::new(),
        }
    }
}

/// A chunk plus its embedding vector, ready for persistence or upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub model: ModelId,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One retrieved chunk, carrying its distance from a `search` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub distance: f32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Present only after a `rerank` pass has scored this result.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reranker: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_headings_path_joins_top_to_bottom() {
        let mut headings = HeadingMap::new();
        headings.insert(1, "A".to_string());
        headings.insert(2, "B".to_string());
        assert_eq!(Chunk::full_headings_path(&headings), "A > B");
    }

    #[test]
    fn deepest_heading_picks_highest_level() {
        let mut headings = HeadingMap::new();
        headings.insert(1, "A".to_string());
        headings.insert(3, "C".to_string());
        let deepest = Chunk::deepest_heading(&headings);
        assert_eq!(deepest.len(), 1);
        assert_eq!(deepest.get(&3), Some(&"C".to_string()));
    }

    #[test]
    fn empty_heading_maps_are_not_serialized() {
        let chunk = Chunk {
            chunk_id: "a-1".into(),
            text: "hello".into(),
            headings: HeadingMap::new(),
            heading: HeadingMap::new(),
            full_headings: String::new(),
            keywords: vec![],
            approx_tokens: 1,
            source: "a".into(),
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert!(value.get("headings").is_none());
        assert!(value.get("heading").is_none());
        assert!(value.get("full_headings").is_none());
    }
}
