//! Building the shared subsystems from configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use harbor_agent::QueryLoop;
use harbor_config::{AppConfig, ChromaApiVersion};
use harbor_core::retrieval::DocumentStore;
use harbor_providers::ProviderRouter;
use harbor_retrieval::{ChromaApi, ChromaStore, InMemoryStore, RetrievalGateway};
use harbor_tools::{Collections, default_registry};
use tracing::{info, warn};

pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.context("failed to load configuration")
}

/// The document store selected by `retrieval.backend`.
pub async fn build_store(
    config: &AppConfig,
    router: &ProviderRouter,
) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let retrieval = &config.retrieval;
    if retrieval.backend == "memory" {
        let store = match &retrieval.fixture_path {
            Some(path) => InMemoryStore::from_fixture(path)?,
            None => InMemoryStore::new(),
        };
        store.create_collection(&retrieval.legal_collection).await;
        store.create_collection(&retrieval.manual_collection).await;
        info!(fixture = ?retrieval.fixture_path, "Using in-memory document store");
        return Ok(Arc::new(store));
    }

    let embedder = router
        .embedding(config)
        .context("no provider available for query embeddings")?;
    let api = match retrieval.chroma_api {
        ChromaApiVersion::V1 => ChromaApi::V1,
        ChromaApiVersion::V2 => ChromaApi::V2 {
            tenant: retrieval.chroma_tenant.clone(),
            database: retrieval.chroma_database.clone(),
        },
    };
    info!(url = %retrieval.url, ?api, model = %retrieval.embedding_model, "Using Chroma document store");
    Ok(Arc::new(
        ChromaStore::new(
            retrieval.url.clone(),
            embedder,
            retrieval.embedding_model.clone(),
            retrieval.timeout_secs,
        )
        .with_api(api),
    ))
}

/// The wired query loop plus the store behind its tools.
pub struct Runtime {
    pub query_loop: QueryLoop,
    pub store: Arc<dyn DocumentStore>,
}

pub async fn build_query_loop(config: &AppConfig) -> anyhow::Result<QueryLoop> {
    Ok(build_runtime(config).await?.query_loop)
}

/// Provider, store, tools and loop, wired once.
pub async fn build_runtime(config: &AppConfig) -> anyhow::Result<Runtime> {
    if !config.has_api_key() {
        warn!("No API key configured; model calls will fail until one is set");
    }

    let router = harbor_providers::build_from_config(config);
    let provider = router
        .default()
        .with_context(|| format!("provider '{}' is not configured", config.default_provider))?;

    let store = build_store(config, &router).await?;
    let retrieval = Arc::new(RetrievalGateway::new(
        store.clone(),
        Duration::from_secs(config.retrieval.timeout_secs),
    ));
    let tools = default_registry(
        retrieval,
        Collections {
            legal: config.retrieval.legal_collection.clone(),
            manual: config.retrieval.manual_collection.clone(),
        },
    );

    info!(
        provider = %config.default_provider,
        model = config.generation_model(),
        tools = tools.len(),
        budget = config.agent.iteration_budget,
        "Query loop ready"
    );
    Ok(Runtime {
        query_loop: harbor_agent::build_query_loop(config, provider, Arc::new(tools)),
        store,
    })
}
