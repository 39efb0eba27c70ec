//! Search over the legal corpus: statutes, regulations, articles.

use async_trait::async_trait;
use harbor_core::error::ToolError;
use harbor_core::tool::{ParameterKind, ParameterSpec, Tool, ToolOutcome};
use harbor_retrieval::RetrievalGateway;
use std::sync::Arc;

use crate::shaping;

pub struct LegalSearchTool {
    gateway: Arc<RetrievalGateway>,
    collection: String,
}

impl LegalSearchTool {
    pub fn new(gateway: Arc<RetrievalGateway>, collection: impl Into<String>) -> Self {
        Self {
            gateway,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl Tool for LegalSearchTool {
    fn name(&self) -> &str {
        "search_legal_documents"
    }

    fn description(&self) -> &str {
        "Search harbor-related laws, regulations and individual articles."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("query", ParameterKind::String, "The legal content to search for"),
            ParameterSpec::optional(
                "structure_filter",
                ParameterKind::String,
                "Document structure filter (article, chapter, etc.)",
            ),
            ParameterSpec::optional("n_results", ParameterKind::Integer, "Number of results (1-3)"),
        ]
    }

    async fn execute(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolOutcome, ToolError> {
        let query = shaping::query(arguments)?;
        let n_results = shaping::n_results(arguments);
        let filter = shaping::optional_str(arguments, "structure_filter").map(|s| {
            let mut f = serde_json::Map::new();
            f.insert("structure_type".into(), serde_json::Value::String(s.to_string()));
            f
        });

        tracing::debug!(query, n_results, filtered = filter.is_some(), "Searching legal documents");

        let passages = self
            .gateway
            .search(&self.collection, query, n_results, filter)
            .await;
        Ok(shaping::shape(passages, "legal"))
    }
}
