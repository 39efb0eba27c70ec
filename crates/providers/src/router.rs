//! Provider router — selects the correct model provider based on config.
//!
//! Handles provider creation and hands out the generation provider and the
//! embedding provider (which may differ).

use std::collections::HashMap;
use std::sync::Arc;
use harbor_config::AppConfig;
use harbor_core::provider::Provider;
use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes model requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

fn build_provider(name: &str, api_key: &str, api_url: Option<&str>) -> Arc<dyn Provider> {
    if name == "gemini" {
        let mut p = GeminiProvider::new(api_key);
        if let Some(url) = api_url {
            p = p.with_base_url(url);
        }
        Arc::new(p)
    } else {
        let base_url = api_url
            .map(String::from)
            .unwrap_or_else(|| default_base_url(name));
        Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` table is registered, then the default provider
/// and the embedding provider are added from top-level settings if missing.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        router.register(
            name.clone(),
            build_provider(name, &api_key, provider_config.api_url.as_deref()),
        );
    }

    let api_key = config.api_key.clone().unwrap_or_default();
    let mut required = vec![config.default_provider.clone()];
    if let Some(embedding) = &config.retrieval.embedding_provider {
        required.push(embedding.clone());
    }
    for name in required {
        if router.get(&name).is_none() {
            tracing::debug!(provider = %name, "Registering provider from top-level settings");
            router.register(name.clone(), build_provider(&name, &api_key, None));
        }
    }

    router
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

impl ProviderRouter {
    /// The provider used to embed search queries.
    pub fn embedding(&self, config: &AppConfig) -> Option<Arc<dyn Provider>> {
        match &config.retrieval.embedding_provider {
            Some(name) => self.get(name),
            None => self.default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_config::ProviderConfig;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openai");
        router.register("openai", Arc::new(OpenAiCompatProvider::new(
            "openai",
            default_base_url("openai"),
            "sk-test",
        )));

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config_registers_gemini() {
        let config = AppConfig::default();
        let router = build_from_config(&config);
        let provider = router.default().unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(router.embedding(&config).unwrap().name(), "gemini");
    }

    #[test]
    fn separate_embedding_provider() {
        let mut config = AppConfig::default();
        config.retrieval.embedding_provider = Some("openai".into());
        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_key: None,
                api_url: Some("http://gpu-box:11434/v1".into()),
                default_model: None,
            },
        );

        let router = build_from_config(&config);
        assert_eq!(router.list(), vec!["gemini", "ollama", "openai"]);
        assert_eq!(router.embedding(&config).unwrap().name(), "openai");
    }
}
