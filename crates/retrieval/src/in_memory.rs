//! In-memory store — useful for development and tests.
//!
//! Scores passages by keyword overlap with the query: the fraction of
//! distinct query terms that appear in the passage. Distance is
//! `1 - score`, so lower is better like a real vector store.

use async_trait::async_trait;
use harbor_core::error::RetrievalError;
use harbor_core::retrieval::{DocumentStore, MetadataFilter, SearchPassage, SearchRequest};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One passage as stored.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredPassage {
    pub content: String,
    #[serde(default)]
    pub metadata: MetadataFilter,
}

/// An in-memory store keyed by collection name.
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<StoredPassage>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load collections from a JSON fixture of the form
    /// `{"legal_docs": [{"content": "...", "metadata": {...}}], ...}`.
    pub fn from_fixture(path: &Path) -> Result<Self, RetrievalError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::Unavailable(format!("cannot read fixture {}: {e}", path.display()))
        })?;
        let collections: HashMap<String, Vec<StoredPassage>> = serde_json::from_str(&raw)
            .map_err(|e| {
                RetrievalError::Unavailable(format!("invalid fixture {}: {e}", path.display()))
            })?;

        tracing::info!(
            path = %path.display(),
            collections = collections.len(),
            "Loaded in-memory corpus"
        );

        Ok(Self {
            collections: Arc::new(RwLock::new(collections)),
        })
    }

    /// Create an empty collection if it does not exist yet.
    pub async fn create_collection(&self, name: &str) {
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    /// Append a passage to a collection, creating it if needed.
    pub async fn add(&self, collection: &str, content: impl Into<String>, metadata: MetadataFilter) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(StoredPassage {
                content: content.into(),
                metadata,
            });
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn matches_filter(metadata: &MetadataFilter, filter: Option<&MetadataFilter>) -> bool {
    filter.is_none_or(|f| f.iter().all(|(k, v)| metadata.get(k) == Some(v)))
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchPassage>, RetrievalError> {
        let collections = self.collections.read().await;
        let passages = collections
            .get(&request.collection)
            .ok_or_else(|| RetrievalError::CollectionNotFound(request.collection.clone()))?;

        let query_terms = terms(&request.query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<SearchPassage> = passages
            .iter()
            .filter(|p| matches_filter(&p.metadata, request.filter.as_ref()))
            .filter_map(|p| {
                let passage_terms = terms(&p.content);
                let hits = query_terms.intersection(&passage_terms).count();
                if hits == 0 {
                    return None;
                }
                let score = hits as f32 / query_terms.len() as f32;
                Some(SearchPassage {
                    content: p.content.clone(),
                    source_identifier: p
                        .metadata
                        .get("source_file")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    relevance_distance: 1.0 - score,
                })
            })
            .collect();

        // Stable sort keeps insertion order between equal scores.
        scored.sort_by(|a, b| {
            a.relevance_distance
                .partial_cmp(&b.relevance_distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(request.max_results);

        Ok(scored)
    }
}
