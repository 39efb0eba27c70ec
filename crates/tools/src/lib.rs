//! Retrieval tools the model can call.
//!
//! - `search_legal_documents` — statutes, regulations and articles
//! - `search_manual_documents` — procedures, safety manuals, practical guides
//!
//! Both go through the [`RetrievalGateway`], so a store outage shows up as
//! "no results found" rather than an error.

pub mod legal_search;
pub mod manual_search;
mod shaping;

use harbor_core::tool::ToolRegistry;
use harbor_retrieval::RetrievalGateway;
use std::sync::Arc;

pub use legal_search::LegalSearchTool;
pub use manual_search::ManualSearchTool;

/// Names of the two collections the tools search.
#[derive(Debug, Clone)]
pub struct Collections {
    pub legal: String,
    pub manual: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            legal: "legal_docs".into(),
            manual: "legal_manuals".into(),
        }
    }
}

/// Create the registry with both search tools, legal first.
pub fn default_registry(gateway: Arc<RetrievalGateway>, collections: Collections) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(LegalSearchTool::new(gateway.clone(), collections.legal)));
    registry.register(Box::new(ManualSearchTool::new(gateway, collections.manual)));
    registry
}
