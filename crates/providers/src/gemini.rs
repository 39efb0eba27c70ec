//! Google Gemini provider implementation.
//!
//! Talks to the Generative Language REST API:
//! - `models/{model}:generateContent` for text generation
//! - `models/{model}:batchEmbedContents` for query embeddings
//!
//! The whole conversation arrives as one rendered prompt, so every request
//! carries a single user turn.

use async_trait::async_trait;
use harbor_core::error::ProviderError;
use harbor_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error_for_status, http_client};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The API asks callers to back off for a minute when quota runs out.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            client: http_client(120),
        }
    }

    /// Point at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn model_path(model: &str) -> String {
        if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        }
    }

    fn build_generate_body(request: &ProviderRequest) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: Some(request.prompt.clone()),
                }],
            }],
            generation_config: ApiGenerationConfig {
                temperature: request.generation.temperature,
                max_output_tokens: request.generation.max_output_tokens,
                top_p: request.generation.top_p,
                top_k: request.generation.top_k,
            },
        }
    }

    fn into_provider_response(
        response: GenerateResponse,
        requested_model: &str,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::InvalidResponse(format!("Prompt blocked: {reason}")));
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No candidates in response".into()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(format!(
                "Empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        let usage = response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ProviderResponse {
            text,
            model: response
                .model_version
                .unwrap_or_else(|| requested_model.to_string()),
            usage,
        })
    }

    async fn post<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response.headers().get(reqwest::header::RETRY_AFTER).cloned();
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini returned error");
            return Err(error_for_status(
                status,
                retry_after.as_ref(),
                DEFAULT_RETRY_AFTER_SECS,
                error_body,
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl harbor_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!(
            "{}/{}:generateContent",
            self.base_url,
            Self::model_path(&request.model)
        );

        debug!(model = %request.model, prompt_chars = request.prompt.len(), "Sending generateContent request");

        let body = Self::build_generate_body(&request);
        let response = self.post(&url, &body).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Self::into_provider_response(parsed, &request.model)
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let model_path = Self::model_path(&request.model);
        let url = format!("{}/{}:batchEmbedContents", self.base_url, model_path);

        let body = BatchEmbedRequest {
            requests: request
                .inputs
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model_path.clone(),
                    content: Content {
                        role: None,
                        parts: vec![Part {
                            text: Some(text.clone()),
                        }],
                    },
                })
                .collect(),
        };

        debug!(model = %request.model, count = request.inputs.len(), "Sending embedding request");

        let response = self.post(&url, &body).await?;
        let parsed: BatchEmbedResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(EmbeddingResponse {
            embeddings: parsed.embeddings.into_iter().map(|e| e.values).collect(),
            model: request.model,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models?pageSize=1", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

// --- Generative Language API types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: ApiGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}
