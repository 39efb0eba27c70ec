//! Shared test helpers for model gateway and query loop tests.

use async_trait::async_trait;
use harbor_core::error::{ProviderError, RetrievalError, ToolError};
use harbor_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use harbor_core::retrieval::{DocumentStore, SearchPassage, SearchRequest};
use harbor_core::tool::{ParameterSpec, Tool, ToolOutcome};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted replies.
///
/// Each call to `complete` returns the next reply in the queue and records
/// the prompt it was given. Panics if more calls are made than replies provided.
pub struct SequentialMockProvider {
    replies: Mutex<Vec<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl SequentialMockProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every reply is model text.
    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.prompt);
            prompts.len() - 1
        };
        let replies = self.replies.lock().unwrap();
        let reply = replies.get(call).cloned().unwrap_or_else(|| {
            panic!(
                "SequentialMockProvider: no more replies (call #{call}, have {})",
                replies.len()
            )
        });

        reply.map(|text| ProviderResponse {
            text,
            model: request.model,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }
}

/// Model output requesting the given `(tool, arguments)` calls.
pub fn tool_calls_reply(calls: &[(&str, serde_json::Value)]) -> String {
    let calls: Vec<_> = calls
        .iter()
        .map(|(name, args)| serde_json::json!({"function_name": name, "arguments": args}))
        .collect();
    serde_json::json!({"reasoning": "need evidence", "tool_calls": calls}).to_string()
}

/// Model output carrying a final answer.
pub fn content_reply(answer: &str) -> String {
    serde_json::json!({"reasoning": "enough evidence", "content": answer}).to_string()
}

pub fn rate_limited() -> ProviderError {
    ProviderError::RateLimited { retry_after_secs: 60 }
}

/// A store that always fails, as if the vector database were down.
pub struct UnavailableStore;

#[async_trait]
impl DocumentStore for UnavailableStore {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchPassage>, RetrievalError> {
        Err(RetrievalError::Unavailable("connection refused".into()))
    }
}

/// A tool with a bug in it.
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "search_legal_documents"
    }

    fn description(&self) -> &str {
        "Always panics"
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        Vec::new()
    }

    async fn execute(
        &self,
        _arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolOutcome, ToolError> {
        panic!("index out of bounds in result shaping");
    }
}
