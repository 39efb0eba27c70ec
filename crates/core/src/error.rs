//! Error types for the Harbor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator (model backend, document store, tools) has its own enum.

use thiserror::Error;

/// Failures that escape the query loop.
///
/// Collaborator failures are folded into answers and tool outcomes before
/// they reach the loop, so only serialization is left here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether this failure signals that the backend is throttling us.
    ///
    /// Covers the dedicated variant as well as a raw 429 surfaced through
    /// `ApiError` or a message that carries the status code.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { status_code, .. } => *status_code == 429,
            ProviderError::Network(msg) | ProviderError::InvalidResponse(msg) => {
                msg.contains("429")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Search timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
