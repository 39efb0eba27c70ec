//! DocumentStore trait — the abstraction over the vector-similarity store.
//!
//! The store holds named collections of text passages with metadata. The
//! retrieval gateway is its only caller; tools never see a store directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RetrievalError;

/// Equality constraints on passage metadata (`{"structure_type": "article"}`).
pub type MetadataFilter = serde_json::Map<String, serde_json::Value>;

/// A similarity search against one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Collection name (e.g., "legal_docs")
    pub collection: String,

    /// Free-text query
    pub query: String,

    /// Maximum number of passages, at least 1
    pub max_results: usize,

    /// Optional metadata filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetadataFilter>,
}

/// One retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPassage {
    /// Passage text
    pub content: String,

    /// Originating file, `"unknown"` when the store has none
    pub source_identifier: String,

    /// Lower is more similar
    pub relevance_distance: f32,
}

/// The core DocumentStore trait.
///
/// Implementations: Chroma (REST), in-memory (development and tests).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The backend name (e.g., "chroma", "memory").
    fn name(&self) -> &str;

    /// Return up to `max_results` passages, most similar first.
    async fn search(&self, request: &SearchRequest) -> std::result::Result<Vec<SearchPassage>, RetrievalError>;

    /// Health check — can we reach the store?
    async fn health_check(&self) -> std::result::Result<bool, RetrievalError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_omits_empty_filter() {
        let req = SearchRequest {
            collection: "legal_docs".into(),
            query: "anchorage".into(),
            max_results: 2,
            filter: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("filter").is_none());
        assert_eq!(json["max_results"], 2);
    }
}
