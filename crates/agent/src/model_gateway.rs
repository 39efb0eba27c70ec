//! The model gateway: one call to the language model, one decision back.
//!
//! Renders the conversation into a prompt, calls the provider under a
//! timeout, and interprets the raw text as tool calls, an answer, or an
//! error. It never returns `Err`: every failure is a `ModelDecision::Error`
//! with a message that can be shown to the user as-is.

use std::sync::Arc;
use std::time::Duration;

use harbor_core::decision::{DecisionErrorKind, ModelDecision};
use harbor_core::error::ProviderError;
use harbor_core::message::ConversationMessage;
use harbor_core::provider::{GenerationConfig, Provider, ProviderRequest};
use harbor_core::tool::{ToolDefinition, ToolInvocationRequest};
use tracing::{debug, error, trace, warn};

use crate::json_extract;
use crate::prompt;
use crate::retry::RetryPolicy;

pub const RATE_LIMIT_MESSAGE: &str =
    "The model API request limit was exceeded. Please try again in one minute.";

pub const BACKEND_ERROR_MESSAGE: &str = "Sorry, a response cannot be generated right now.";

pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    model: String,
    generation: GenerationConfig,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            generation: GenerationConfig::default(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ask the model what to do next. `tools = None` disables the tool path.
    pub async fn decide(
        &self,
        conversation: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> ModelDecision {
        let prompt = prompt::render(conversation, tools);
        debug!(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            messages = conversation.len(),
            tools = tools.map_or(0, |t| t.len()),
            "Calling model"
        );
        trace!(%prompt, "Rendered prompt");

        let mut attempt = 0;
        loop {
            match self.call(&prompt).await {
                Ok(text) => return interpret(&text),
                Err(e) if e.is_rate_limited() && attempt < self.retry.max_retries => {
                    let hint = match &e {
                        ProviderError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
                        _ => None,
                    };
                    let delay = self.retry.delay_with_hint(attempt, hint);
                    warn!(
                        attempt = attempt + 1,
                        max = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Model rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return error_decision(&e),
            }
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            generation: self.generation.clone(),
        };
        match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(result) => result.map(|r| r.text),
            Err(_) => Err(ProviderError::Timeout(format!(
                "no model response within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

fn error_decision(e: &ProviderError) -> ModelDecision {
    if e.is_rate_limited() {
        warn!(error = %e, "Model rate limited");
        ModelDecision::Error {
            kind: DecisionErrorKind::RateLimited,
            message: RATE_LIMIT_MESSAGE.into(),
        }
    } else {
        error!(error = %e, "Model call failed");
        ModelDecision::Error {
            kind: DecisionErrorKind::Backend,
            message: BACKEND_ERROR_MESSAGE.into(),
        }
    }
}

/// Interpret raw model output.
pub fn interpret(raw: &str) -> ModelDecision {
    let raw = raw.trim();
    let Some(obj) = json_extract::first_object(raw) else {
        return ModelDecision::Text(raw.to_string());
    };

    if let Some(serde_json::Value::Array(entries)) = obj.get("tool_calls") {
        let calls: Vec<ToolInvocationRequest> = entries.iter().filter_map(parse_tool_call).collect();
        if !calls.is_empty() {
            return ModelDecision::ToolCalls(calls);
        }
    }

    match obj.get("content") {
        Some(serde_json::Value::String(s)) => ModelDecision::Text(s.clone()),
        Some(serde_json::Value::Null) | None => ModelDecision::Text(raw.to_string()),
        Some(other) => ModelDecision::Text(other.to_string()),
    }
}

fn parse_tool_call(entry: &serde_json::Value) -> Option<ToolInvocationRequest> {
    let entry = entry.as_object()?;
    let name = entry
        .get("function_name")
        .or_else(|| entry.get("name"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())?;

    let arguments = match entry.get("arguments") {
        Some(serde_json::Value::Object(map)) => map.clone(),
        Some(serde_json::Value::String(s)) => match serde_json::from_str(s) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        },
        _ => serde_json::Map::new(),
    };

    Some(ToolInvocationRequest::new(name, arguments))
}
