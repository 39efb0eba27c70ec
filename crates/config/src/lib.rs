//! Configuration loading, validation, and management for Harbor.
//!
//! Loads configuration from `~/.harbor/config.toml` (or the path in
//! `HARBOR_CONFIG`) with environment variable overrides. Validates all
//! settings at startup.

use harbor_core::GenerationConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.harbor/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the default provider (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling parameters for every model call
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Query loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Document store settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.5-flash-lite".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("generation", &self.generation)
            .field("agent", &self.agent)
            .field("retrieval", &self.retrieval)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("allowed_origins", &self.allowed_origins)
            .field("internal_api_key", &redact(&self.internal_api_key))
            .field("api_key_header", &self.api_key_header)
            .field("auth_validation_url", &self.auth_validation_url)
            .field("auth_timeout_secs", &self.auth_timeout_secs)
            .finish()
    }
}

/// Whether conversation turns survive past a single query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryScope {
    /// Every query starts from a fresh conversation
    #[default]
    Query,
    /// Turns are kept per session id
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of tool-enabled model calls before forcing an answer
    #[serde(default = "default_iteration_budget")]
    pub iteration_budget: u32,

    #[serde(default)]
    pub history_scope: HistoryScope,

    /// Turns (question + answer) kept per session
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Sessions held at once; the least recently written one is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Replace the built-in persona and grounding rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    /// Extra attempts on a rate-limited model call (0 = report immediately)
    #[serde(default)]
    pub rate_limit_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_iteration_budget() -> u32 {
    2
}
fn default_max_history_turns() -> usize {
    10
}
fn default_max_sessions() -> usize {
    1000
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_retry_max_delay_ms() -> u64 {
    60_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            iteration_budget: default_iteration_budget(),
            history_scope: HistoryScope::default(),
            max_history_turns: default_max_history_turns(),
            max_sessions: default_max_sessions(),
            system_prompt_override: None,
            model_timeout_secs: default_model_timeout_secs(),
            rate_limit_retries: 0,
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// "chroma" or "memory"
    #[serde(default = "default_retrieval_backend")]
    pub backend: String,

    /// Chroma server base URL
    #[serde(default = "default_chroma_url")]
    pub url: String,

    #[serde(default = "default_legal_collection")]
    pub legal_collection: String,

    #[serde(default = "default_manual_collection")]
    pub manual_collection: String,

    /// Per-search timeout
    #[serde(default = "default_retrieval_timeout_secs")]
    pub timeout_secs: u64,

    /// Provider used to embed queries (defaults to `default_provider`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,

    /// Must match the model the collections were indexed with
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// JSON corpus for the in-memory backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture_path: Option<PathBuf>,

    #[serde(default)]
    pub chroma_api: ChromaApiVersion,

    /// Tenant for the v2 API
    #[serde(default = "default_chroma_tenant")]
    pub chroma_tenant: String,

    /// Database for the v2 API
    #[serde(default = "default_chroma_database")]
    pub chroma_database: String,
}

/// Chroma REST API generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChromaApiVersion {
    /// `/api/v1`, served by Chroma 0.4 and 0.5
    V1,
    /// `/api/v2/tenants/{tenant}/databases/{database}`, Chroma 0.6 and 1.x
    #[default]
    V2,
}

fn default_retrieval_backend() -> String {
    "chroma".into()
}
fn default_chroma_url() -> String {
    "http://127.0.0.1:8001".into()
}
fn default_legal_collection() -> String {
    "legal_docs".into()
}
fn default_manual_collection() -> String {
    "legal_manuals".into()
}
fn default_retrieval_timeout_secs() -> u64 {
    10
}
fn default_embedding_model() -> String {
    "text-embedding-004".into()
}
fn default_chroma_tenant() -> String {
    "default_tenant".into()
}
fn default_chroma_database() -> String {
    "default_database".into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: default_retrieval_backend(),
            url: default_chroma_url(),
            legal_collection: default_legal_collection(),
            manual_collection: default_manual_collection(),
            timeout_secs: default_retrieval_timeout_secs(),
            embedding_provider: None,
            embedding_model: default_embedding_model(),
            fixture_path: None,
            chroma_api: ChromaApiVersion::default(),
            chroma_tenant: default_chroma_tenant(),
            chroma_database: default_chroma_database(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allowlist. ["*"] = allow all.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Shared secret required on `/harbor/*` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_api_key: Option<String>,

    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Upstream endpoint that validates bearer tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_validation_url: Option<String>,

    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:8080".into(), "http://localhost:3000".into()]
}
fn default_api_key_header() -> String {
    "X-API-Key".into()
}
fn default_auth_timeout_secs() -> u64 {
    5
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            internal_api_key: None,
            api_key_header: default_api_key_header(),
            auth_validation_url: None,
            auth_timeout_secs: default_auth_timeout_secs(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Generation model when this is the default provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from `HARBOR_CONFIG` or the default path
    /// (~/.harbor/config.toml), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("HARBOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_path());
        Self::load_with_env(&path)
    }

    /// Load from an explicit path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// API key precedence: `HARBOR_API_KEY`, then `GEMINI_API_KEY`, then
    /// `OPENAI_API_KEY`, and only when the file did not set one.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("HARBOR_API_KEY")
                .or_else(|| lookup("GEMINI_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("HARBOR_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("HARBOR_MODEL") {
            self.default_model = model;
        }
        if let Some(url) = lookup("CHROMA_URL") {
            self.retrieval.url = url;
        }
        if let Some(host) = lookup("HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("PORT must be a port number, got '{port}'"))
            })?;
        }
        if let Some(key) = lookup("INTERNAL_API_KEY").filter(|k| !k.is_empty()) {
            self.gateway.internal_api_key = Some(key);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".harbor")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.generation;
        if !(0.0..=2.0).contains(&g.temperature) {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&g.top_p) {
            return Err(ConfigError::ValidationError(
                "generation.top_p must be between 0.0 and 1.0".into(),
            ));
        }
        if g.max_output_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "generation.max_output_tokens must be > 0".into(),
            ));
        }

        if self.agent.iteration_budget == 0 {
            return Err(ConfigError::ValidationError(
                "agent.iteration_budget must be at least 1".into(),
            ));
        }
        if self.agent.max_history_turns == 0 || self.agent.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_history_turns and agent.max_sessions must be at least 1".into(),
            ));
        }
        if self.agent.model_timeout_secs == 0 || self.retrieval.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }

        match self.retrieval.backend.as_str() {
            "chroma" | "memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "retrieval.backend must be 'chroma' or 'memory', got '{other}'"
                )));
            }
        }
        if self.retrieval.legal_collection.trim().is_empty()
            || self.retrieval.manual_collection.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "collection names must not be empty".into(),
            ));
        }

        if self.gateway.api_key_header.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "gateway.api_key_header must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Generation model: `providers.<default_provider>.default_model`,
    /// else the top-level `default_model`.
    pub fn generation_model(&self) -> &str {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.as_deref())
            .unwrap_or(&self.default_model)
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            generation: GenerationConfig::default(),
            agent: AgentConfig::default(),
            retrieval: RetrievalConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.default_model, "gemini-2.5-flash-lite");
        assert_eq!(config.agent.iteration_budget, 2);
        assert_eq!(config.agent.history_scope, HistoryScope::Query);
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.retrieval.legal_collection, "legal_docs");
        assert_eq!(config.retrieval.manual_collection, "legal_manuals");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.generation, config.generation);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
default_provider = "openai"

[agent]
history_scope = "session"
iteration_budget = 3

[retrieval]
backend = "memory"
fixture_path = "corpus.json"

[gateway]
allowed_origins = ["*"]
internal_api_key = "s3cret"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.agent.history_scope, HistoryScope::Session);
        assert_eq!(config.agent.iteration_budget, 3);
        assert_eq!(config.agent.max_history_turns, 10);
        assert_eq!(config.agent.max_sessions, 1000);
        assert_eq!(config.retrieval.backend, "memory");
        assert_eq!(config.retrieval.fixture_path, Some(PathBuf::from("corpus.json")));
        assert_eq!(config.retrieval.timeout_secs, 10);
        assert_eq!(config.retrieval.chroma_api, ChromaApiVersion::V2);
        assert_eq!(config.retrieval.chroma_tenant, "default_tenant");
        assert_eq!(config.gateway.allowed_origins, vec!["*"]);
        assert_eq!(config.gateway.api_key_header, "X-API-Key");
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.generation.temperature = 5.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.iteration_budget = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.max_sessions = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retrieval.backend = "sqlite".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sqlite"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "gemini");
    }

    #[test]
    fn load_from_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_model = \"gemini-2.0-flash\"\n[gateway]\nport = 9100").unwrap();
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "gemini-2.0-flash");
        assert_eq!(config.gateway.port, 9100);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_model = [unterminated").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env(env_from(&[
                ("GEMINI_API_KEY", "g-key"),
                ("OPENAI_API_KEY", "o-key"),
                ("HARBOR_MODEL", "gemini-2.5-pro"),
                ("CHROMA_URL", "http://chroma:8000"),
                ("PORT", "9000"),
                ("INTERNAL_API_KEY", "internal"),
            ]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.default_model, "gemini-2.5-pro");
        assert_eq!(config.retrieval.url, "http://chroma:8000");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.internal_api_key.as_deref(), Some("internal"));
    }

    #[test]
    fn env_does_not_replace_file_api_key() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(env_from(&[("HARBOR_API_KEY", "from-env")])).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn empty_internal_key_env_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[("INTERNAL_API_KEY", "")])).unwrap();
        assert!(config.gateway.internal_api_key.is_none());
    }

    #[test]
    fn bad_port_env_rejected() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-very-secret".into()),
            ..AppConfig::default()
        };
        config.gateway.internal_api_key = Some("internal-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("internal-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn chroma_v1_api_selectable() {
        let config: AppConfig = toml::from_str("[retrieval]\nchroma_api = \"v1\"\n").unwrap();
        assert_eq!(config.retrieval.chroma_api, ChromaApiVersion::V1);
        assert!(toml::from_str::<AppConfig>("[retrieval]\nchroma_api = \"v3\"\n").is_err());
    }

    #[test]
    fn provider_model_overrides_top_level() {
        let toml_str = r#"
default_provider = "openai"
default_model = "gemini-2.5-flash-lite"

[providers.openai]
default_model = "gpt-4o-mini"

[providers.ollama]
default_model = "llama3"
"#;
        let mut config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.generation_model(), "gpt-4o-mini");

        config.default_provider = "gemini".into();
        assert_eq!(config.generation_model(), "gemini-2.5-flash-lite");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini-2.5-flash-lite"));
        assert!(toml_str.contains("legal_manuals"));
        assert!(toml_str.contains("8000"));
    }
}
