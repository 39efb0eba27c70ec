//! Chroma vector store over its REST API.
//!
//! Queries are embedded with the configured embedding provider, so the
//! embedding model must be the one the collections were indexed with.
//! Collection ids are resolved by name once and cached.
//!
//! Chroma 0.6 and 1.x serve the tenant-scoped v2 API ([`ChromaApi::V2`],
//! the default). Chroma 0.4 and 0.5 only serve v1 ([`ChromaApi::V1`]).

use async_trait::async_trait;
use harbor_core::error::RetrievalError;
use harbor_core::provider::{EmbeddingRequest, Provider};
use harbor_core::retrieval::{DocumentStore, SearchPassage, SearchRequest};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Which REST API generation the server speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChromaApi {
    V1,
    V2 { tenant: String, database: String },
}

impl Default for ChromaApi {
    fn default() -> Self {
        ChromaApi::V2 {
            tenant: "default_tenant".into(),
            database: "default_database".into(),
        }
    }
}

impl ChromaApi {
    fn collections_url(&self, base_url: &str) -> String {
        match self {
            ChromaApi::V1 => format!("{base_url}/api/v1/collections"),
            ChromaApi::V2 { tenant, database } => {
                format!("{base_url}/api/v2/tenants/{tenant}/databases/{database}/collections")
            }
        }
    }

    fn heartbeat_url(&self, base_url: &str) -> String {
        match self {
            ChromaApi::V1 => format!("{base_url}/api/v1/heartbeat"),
            ChromaApi::V2 { .. } => format!("{base_url}/api/v2/heartbeat"),
        }
    }
}

pub struct ChromaStore {
    base_url: String,
    api: ChromaApi,
    client: reqwest::Client,
    embedder: Arc<dyn Provider>,
    embedding_model: String,
    collection_ids: RwLock<HashMap<String, String>>,
}

impl ChromaStore {
    pub fn new(
        base_url: impl Into<String>,
        embedder: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api: ChromaApi::default(),
            client,
            embedder,
            embedding_model: embedding_model.into(),
            collection_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_api(mut self, api: ChromaApi) -> Self {
        self.api = api;
        self
    }

    async fn collection_id(&self, name: &str) -> Result<String, RetrievalError> {
        if let Some(id) = self.collection_ids.read().await.get(name) {
            return Ok(id.clone());
        }

        let url = format!("{}/{}", self.api.collections_url(&self.base_url), name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RetrievalError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RetrievalError::CollectionNotFound(name.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Older servers answer a missing collection with 500 + "does not exist".
            if body.contains("does not exist") {
                return Err(RetrievalError::CollectionNotFound(name.to_string()));
            }
            return Err(RetrievalError::QueryFailed(format!("status {status}: {body}")));
        }

        let collection: CollectionInfo = response
            .json()
            .await
            .map_err(|e| RetrievalError::QueryFailed(format!("bad collection response: {e}")))?;

        debug!(collection = name, id = %collection.id, "Resolved Chroma collection");
        self.collection_ids
            .write()
            .await
            .insert(name.to_string(), collection.id.clone());
        Ok(collection.id)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        let response = self
            .embedder
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![query.to_string()],
            })
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("no embedding returned".into()))
    }

    fn query_body(request: &SearchRequest, embedding: Vec<f32>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": request.max_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = request.filter.as_ref().filter(|f| !f.is_empty()) {
            body["where"] = serde_json::Value::Object(filter.clone());
        }
        body
    }
}

/// Flatten the first query's columns into passages, keeping backend order.
fn decode_query_response(response: QueryResponse) -> Vec<SearchPassage> {
    let documents = response.documents.into_iter().next().unwrap_or_default();
    let metadatas = response.metadatas.into_iter().next().unwrap_or_default();
    let distances = response.distances.into_iter().next().unwrap_or_default();

    documents
        .into_iter()
        .enumerate()
        .filter_map(|(i, doc)| {
            let content = doc?;
            let source_identifier = metadatas
                .get(i)
                .and_then(|m| m.as_ref())
                .and_then(|m| m.get("source_file"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            Some(SearchPassage {
                content,
                source_identifier,
                relevance_distance: distances.get(i).copied().flatten().unwrap_or(f32::MAX),
            })
        })
        .collect()
}

#[async_trait]
impl DocumentStore for ChromaStore {
    fn name(&self) -> &str {
        "chroma"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchPassage>, RetrievalError> {
        let id = self.collection_id(&request.collection).await?;
        let embedding = self.embed_query(&request.query).await?;

        let url = format!("{}/{}/query", self.api.collections_url(&self.base_url), id);
        let response = self
            .client
            .post(&url)
            .json(&Self::query_body(request, embedding))
            .send()
            .await
            .map_err(|e| RetrievalError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::QueryFailed(format!("status {status}: {body}")));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::QueryFailed(format!("bad query response: {e}")))?;

        Ok(decode_query_response(parsed))
    }

    async fn health_check(&self) -> Result<bool, RetrievalError> {
        let url = self.api.heartbeat_url(&self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RetrievalError::Unavailable(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

// --- Chroma API types ---

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<serde_json::Map<String, serde_json::Value>>>>,
    #[serde(default)]
    distances: Vec<Vec<Option<f32>>>,
}
