//! The single entry point tools use to query the document store.
//!
//! Never raises: backend errors, missing collections and timeouts are
//! logged and become an empty result, so a retrieval failure reads to the
//! model as "nothing found".

use harbor_core::error::RetrievalError;
use harbor_core::retrieval::{DocumentStore, MetadataFilter, SearchPassage, SearchRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct RetrievalGateway {
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
}

impl RetrievalGateway {
    pub fn new(store: Arc<dyn DocumentStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Search `collection` for up to `max_results` passages (at least one).
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        max_results: usize,
        filter: Option<MetadataFilter>,
    ) -> Vec<SearchPassage> {
        let request = SearchRequest {
            collection: collection.to_string(),
            query: query.to_string(),
            max_results: max_results.max(1),
            filter,
        };

        match self.try_search(&request).await {
            Ok(passages) => {
                debug!(
                    backend = self.store.name(),
                    collection,
                    found = passages.len(),
                    "Retrieval complete"
                );
                passages
            }
            Err(e) => {
                warn!(backend = self.store.name(), collection, error = %e, "Retrieval failed");
                Vec::new()
            }
        }
    }

    async fn try_search(&self, request: &SearchRequest) -> Result<Vec<SearchPassage>, RetrievalError> {
        tokio::time::timeout(self.timeout, self.store.search(request))
            .await
            .map_err(|_| RetrievalError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })?
    }
}
