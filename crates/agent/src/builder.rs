//! Wiring a `QueryLoop` from configuration.

use std::sync::Arc;
use std::time::Duration;

use harbor_config::{AppConfig, HistoryScope};
use harbor_core::provider::Provider;
use harbor_core::tool::ToolRegistry;

use crate::history::SessionHistory;
use crate::loop_runner::QueryLoop;
use crate::model_gateway::ModelGateway;
use crate::retry::RetryPolicy;

pub fn build_query_loop(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
) -> QueryLoop {
    let agent = &config.agent;
    let retry = RetryPolicy {
        max_retries: agent.rate_limit_retries,
        base_delay_ms: agent.retry_base_delay_ms,
        max_delay_ms: agent.retry_max_delay_ms,
        ..RetryPolicy::default()
    };

    let gateway = ModelGateway::new(provider, config.generation_model())
        .with_generation(config.generation.clone())
        .with_timeout(Duration::from_secs(agent.model_timeout_secs))
        .with_retry(retry);

    let mut query_loop = QueryLoop::new(gateway, tools).with_iteration_budget(agent.iteration_budget);
    if let Some(prompt) = &agent.system_prompt_override {
        query_loop = query_loop.with_system_prompt(prompt.clone());
    }
    if agent.history_scope == HistoryScope::Session {
        query_loop = query_loop.with_session_history(Arc::new(SessionHistory::new(
            agent.max_history_turns,
            agent.max_sessions,
        )));
    }
    query_loop
}
