//! Language-model provider implementations for Harbor.
//!
//! All providers implement the `harbor_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod gemini;
pub mod openai_compat;
pub mod router;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};

use harbor_core::ProviderError;

/// Map a non-success HTTP status to the matching provider error.
///
/// `retry_after_secs` is used for 429 responses when the backend did not
/// send a usable `Retry-After` header.
pub(crate) fn error_for_status(
    status: u16,
    retry_after: Option<&reqwest::header::HeaderValue>,
    retry_after_secs: u64,
    body: String,
) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(retry_after_secs),
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Shared HTTP client with a request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}
