//! Search over the procedural manuals: workflows, safety, practical guides.

use async_trait::async_trait;
use harbor_core::error::ToolError;
use harbor_core::tool::{ParameterKind, ParameterSpec, Tool, ToolOutcome};
use harbor_retrieval::RetrievalGateway;
use std::sync::Arc;

use crate::shaping;

pub struct ManualSearchTool {
    gateway: Arc<RetrievalGateway>,
    collection: String,
}

impl ManualSearchTool {
    pub fn new(gateway: Arc<RetrievalGateway>, collection: impl Into<String>) -> Self {
        Self {
            gateway,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl Tool for ManualSearchTool {
    fn name(&self) -> &str {
        "search_manual_documents"
    }

    fn description(&self) -> &str {
        "Search harbor work procedures, safety manuals and practical guides."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("query", ParameterKind::String, "The procedure or method to search for"),
            ParameterSpec::optional("n_results", ParameterKind::Integer, "Number of results (1-3)"),
        ]
    }

    async fn execute(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolOutcome, ToolError> {
        let query = shaping::query(arguments)?;
        let n_results = shaping::n_results(arguments);

        tracing::debug!(query, n_results, "Searching manual documents");

        let passages = self
            .gateway
            .search(&self.collection, query, n_results, None)
            .await;
        Ok(shaping::shape(passages, "manual"))
    }
}
