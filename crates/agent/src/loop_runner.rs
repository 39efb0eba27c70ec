//! The query loop: bounded alternation between model decisions and tool calls.
//!
//! ```text
//! Seeded → Deciding → (ToolDispatch → Deciding)* → Concluded
//! ```
//!
//! At most `iteration_budget` decisions are made with tools enabled. If the
//! model is still asking for tools after that, one more call is made with
//! the tool catalog withheld so it has to answer.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use harbor_core::decision::ModelDecision;
use harbor_core::message::ConversationMessage;
use harbor_core::query::QueryResult;
use harbor_core::tool::{ToolCallLog, ToolInvocationResult, ToolRegistry};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::history::SessionHistory;
use crate::model_gateway::ModelGateway;
use crate::prompt::{DEFAULT_SYSTEM_PROMPT, SYNTHESIS_INSTRUCTION};

pub const SYSTEM_ERROR_MESSAGE: &str = "A system error occurred. Please try again later.";

pub const CONVERGENCE_FAILURE_MESSAGE: &str =
    "Failed to generate a final answer. The information gathered so far is listed in the tool call log.";

/// How a run ended, before history bookkeeping.
struct Concluded {
    result: QueryResult,
    /// The answer came from the model rather than an error or fallback message.
    answered: bool,
}

pub struct QueryLoop {
    gateway: ModelGateway,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    iteration_budget: u32,
    history: Option<Arc<SessionHistory>>,
}

impl QueryLoop {
    pub fn new(gateway: ModelGateway, tools: Arc<ToolRegistry>) -> Self {
        Self {
            gateway,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            iteration_budget: 2,
            history: None,
        }
    }

    /// Set the maximum number of tool-enabled model calls.
    pub fn with_iteration_budget(mut self, budget: u32) -> Self {
        self.iteration_budget = budget.max(1);
        self
    }

    /// Replace the built-in persona and grounding rules.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Keep question/answer turns per session id.
    pub fn with_session_history(mut self, history: Arc<SessionHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn iteration_budget(&self) -> u32 {
        self.iteration_budget
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer a standalone query. Never fails.
    pub async fn process_query(&self, query: &str) -> QueryResult {
        self.process_in_session(None, query).await
    }

    /// Answer a query, replaying and extending the session's history when
    /// session history is enabled and `session_id` is given.
    pub async fn process_in_session(&self, session_id: Option<&str>, query: &str) -> QueryResult {
        let query_id = uuid::Uuid::new_v4();
        let span = info_span!("query", %query_id, session = session_id.unwrap_or("-"));

        async move {
            let session = self.history.as_ref().zip(session_id);
            let prior = match session {
                Some((history, id)) => history.messages(id).await,
                None => Vec::new(),
            };

            info!(query_chars = query.chars().count(), prior_messages = prior.len(), "Processing query");

            // Requires `panic = "unwind"`; the release profile must not abort.
            let outcome = AssertUnwindSafe(self.run(query, prior)).catch_unwind().await;
            let concluded = match outcome {
                Ok(Ok(concluded)) => concluded,
                Ok(Err(e)) => {
                    error!(error = %e, "Query loop failed");
                    Self::catastrophic()
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".into());
                    error!(%reason, "Query loop panicked");
                    Self::catastrophic()
                }
            };

            if concluded.answered {
                if let Some((history, id)) = session {
                    history.commit(id, query, &concluded.result.answer).await;
                }
            }

            info!(
                iterations = concluded.result.iteration_count,
                tool_calls = concluded.result.tool_call_log.len(),
                "Query concluded"
            );
            concluded.result
        }
        .instrument(span)
        .await
    }

    fn catastrophic() -> Concluded {
        Concluded {
            result: QueryResult {
                answer: SYSTEM_ERROR_MESSAGE.into(),
                tool_call_log: ToolCallLog::new(),
                iteration_count: 0,
            },
            answered: false,
        }
    }

    async fn run(
        &self,
        query: &str,
        prior: Vec<ConversationMessage>,
    ) -> Result<Concluded, harbor_core::Error> {
        let mut conversation = Vec::with_capacity(prior.len() + 4);
        conversation.push(ConversationMessage::system(self.system_prompt.clone()));
        conversation.extend(prior);
        conversation.push(ConversationMessage::user(query));

        let catalog = self.tools.definitions();
        let mut log = ToolCallLog::new();
        let mut iterations = 0u32;

        while iterations < self.iteration_budget {
            iterations += 1;
            debug!(iteration = iterations, budget = self.iteration_budget, "Deciding");

            match self.gateway.decide(&conversation, Some(&catalog)).await {
                ModelDecision::ToolCalls(calls) => {
                    for call in calls {
                        info!(tool = %call.tool_name, "Dispatching tool");
                        let outcome = self.tools.dispatch(&call).await;
                        let summary = serde_json::to_string(&outcome)?;
                        conversation.push(ConversationMessage::tool(format!(
                            "Result of tool '{}': {}",
                            call.tool_name, summary
                        )));
                        log.push(ToolInvocationResult {
                            tool_name: call.tool_name,
                            arguments: call.arguments,
                            outcome,
                        });
                    }
                }
                ModelDecision::Text(answer) => {
                    conversation.push(ConversationMessage::assistant(answer.clone()));
                    return Ok(Concluded {
                        result: QueryResult {
                            answer,
                            tool_call_log: log,
                            iteration_count: iterations,
                        },
                        answered: true,
                    });
                }
                ModelDecision::Error { kind, message } => {
                    warn!(?kind, iteration = iterations, "Model call failed, concluding");
                    return Ok(Concluded {
                        result: QueryResult {
                            answer: message,
                            tool_call_log: log,
                            iteration_count: iterations,
                        },
                        answered: false,
                    });
                }
            }
        }

        info!(budget = self.iteration_budget, "Iteration budget spent, forcing a final answer");
        conversation.push(ConversationMessage::user(SYNTHESIS_INSTRUCTION));
        iterations += 1;

        let (answer, answered) = match self.gateway.decide(&conversation, None).await {
            ModelDecision::Text(answer) => (answer, true),
            other => {
                warn!(decision = ?other, "Forced convergence produced no answer");
                (CONVERGENCE_FAILURE_MESSAGE.to_string(), false)
            }
        };

        Ok(Concluded {
            result: QueryResult {
                answer,
                tool_call_log: log,
                iteration_count: iterations,
            },
            answered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_gateway::RATE_LIMIT_MESSAGE;
    use crate::test_helpers::*;
    use harbor_core::retrieval::DocumentStore;
    use harbor_core::tool::ToolOutcome;
    use harbor_retrieval::{InMemoryStore, RetrievalGateway};
    use harbor_tools::{Collections, default_registry};
    use std::time::Duration;

    async fn corpus() -> Arc<dyn DocumentStore> {
        let store = InMemoryStore::new();
        let meta = |file: &str| {
            serde_json::json!({"source_file": file, "structure_type": "article"})
                .as_object()
                .cloned()
                .unwrap()
        };
        store
            .add(
                "legal_docs",
                "Port facility use fees are calculated by tonnage and days of berthing",
                meta("harbor_fee_rules.pdf"),
            )
            .await;
        store
            .add(
                "legal_manuals",
                "Fee payment is made through the port management information system",
                meta("fee_manual.pdf"),
            )
            .await;
        Arc::new(store)
    }

    fn registry_over(store: Arc<dyn DocumentStore>) -> Arc<ToolRegistry> {
        let gateway = Arc::new(RetrievalGateway::new(store, Duration::from_secs(1)));
        Arc::new(default_registry(gateway, Collections::default()))
    }

    fn query_loop(provider: Arc<SequentialMockProvider>, tools: Arc<ToolRegistry>) -> QueryLoop {
        QueryLoop::new(ModelGateway::new(provider, "gemini-2.5-flash-lite"), tools)
    }

    fn legal_call() -> (&'static str, serde_json::Value) {
        ("search_legal_documents", serde_json::json!({"query": "port facility use fee"}))
    }

    #[tokio::test]
    async fn direct_answer_uses_one_iteration() {
        let provider = Arc::new(SequentialMockProvider::texts(&[&content_reply("Hello.")]));
        let ql = query_loop(provider.clone(), registry_over(corpus().await));

        let result = ql.process_query("hi").await;
        assert_eq!(result.answer, "Hello.");
        assert_eq!(result.iteration_count, 1);
        assert!(result.tool_call_log.is_empty());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_then_answer_takes_two_iterations() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            &tool_calls_reply(&[legal_call()]),
            &content_reply("Fees depend on tonnage and berthing days."),
        ]));
        let ql = query_loop(provider.clone(), registry_over(corpus().await));

        let result = ql
            .process_query("What is the fee calculation for port facility use?")
            .await;
        assert_eq!(result.iteration_count, 2);
        assert_eq!(result.tool_call_log.len(), 1);
        assert_eq!(result.answer, "Fees depend on tonnage and berthing days.");

        let entry = result.tool_call_log.iter().next().unwrap();
        assert_eq!(entry.outcome.first_source(), Some("harbor_fee_rules.pdf"));

        // The second prompt carries the serialized tool result.
        let prompts = provider.prompts();
        assert!(prompts[1].contains("# Tool results:\nResult of tool 'search_legal_documents': {\"message\":\"found 1 legal passages\""));
    }

    #[tokio::test]
    async fn exhausted_budget_forces_final_answer() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            &tool_calls_reply(&[legal_call()]),
            &tool_calls_reply(&[("search_manual_documents", serde_json::json!({"query": "fee payment"}))]),
            &content_reply("Synthesized answer."),
        ]));
        let ql = query_loop(provider.clone(), registry_over(corpus().await));

        let result = ql.process_query("How are fees paid?").await;
        assert_eq!(result.iteration_count, 3);
        assert_eq!(result.answer, "Synthesized answer.");
        assert_eq!(result.tool_call_log.len(), 2);

        // The convergence call has no catalog but carries the instruction.
        let prompts = provider.prompts();
        assert!(prompts[0].contains("# Available tools:"));
        assert!(prompts[1].contains("# Available tools:"));
        assert!(!prompts[2].contains("# Available tools:"));
        assert!(prompts[2].contains(SYNTHESIS_INSTRUCTION));
    }

    #[tokio::test]
    async fn forced_convergence_still_requesting_tools_gives_fallback() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            &tool_calls_reply(&[legal_call()]),
            &tool_calls_reply(&[legal_call()]),
            &tool_calls_reply(&[legal_call()]),
        ]));
        let ql = query_loop(provider.clone(), registry_over(corpus().await));

        let result = ql.process_query("q").await;
        assert_eq!(result.answer, CONVERGENCE_FAILURE_MESSAGE);
        assert_eq!(result.iteration_count, 3);
        // The convergence call never dispatches tools.
        assert_eq!(result.tool_call_log.len(), 2);
    }

    #[tokio::test]
    async fn forced_convergence_error_gives_fallback() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(tool_calls_reply(&[legal_call()])),
            Ok(tool_calls_reply(&[legal_call()])),
            Err(rate_limited()),
        ]));
        let ql = query_loop(provider, registry_over(corpus().await));
        let result = ql.process_query("q").await;
        assert_eq!(result.answer, CONVERGENCE_FAILURE_MESSAGE);
        assert_eq!(result.iteration_count, 3);
    }

    #[tokio::test]
    async fn unavailable_store_reads_as_no_results() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            &tool_calls_reply(&[legal_call()]),
            &content_reply("The provided documents did not contain relevant information."),
        ]));
        let ql = query_loop(provider, registry_over(Arc::new(UnavailableStore)));

        let result = ql.process_query("q").await;
        assert_eq!(result.iteration_count, 2);
        let entry = result.tool_call_log.iter().next().unwrap();
        assert_eq!(
            entry.outcome,
            ToolOutcome::Found {
                message: "no results found".into(),
                results: vec![]
            }
        );
    }

    #[tokio::test]
    async fn rate_limit_on_first_call_concludes() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Err(rate_limited())]));
        let ql = query_loop(provider.clone(), registry_over(corpus().await));

        let result = ql.process_query("q").await;
        assert_eq!(result.iteration_count, 1);
        assert_eq!(result.answer, RATE_LIMIT_MESSAGE);
        assert!(result.tool_call_log.is_empty());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn error_after_tools_keeps_partial_log() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(tool_calls_reply(&[legal_call()])),
            Err(harbor_core::ProviderError::Network("reset".into())),
        ]));
        let ql = query_loop(provider, registry_over(corpus().await));
        let result = ql.process_query("q").await;
        assert_eq!(result.iteration_count, 2);
        assert_eq!(result.tool_call_log.len(), 1);
        assert_eq!(result.answer, crate::model_gateway::BACKEND_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn log_is_append_only_across_turns() {
        let a = legal_call();
        let b = ("search_manual_documents", serde_json::json!({"query": "fee payment"}));
        let provider = Arc::new(SequentialMockProvider::texts(&[
            &tool_calls_reply(&[a.clone(), b.clone()]),
            &tool_calls_reply(&[a.clone()]),
            &content_reply("done"),
        ]));
        let ql = query_loop(provider, registry_over(corpus().await));

        let result = ql.process_query("q").await;
        let names: Vec<_> = result.tool_call_log.iter().map(|e| e.tool_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["search_legal_documents", "search_manual_documents", "search_legal_documents"]
        );
        assert_eq!(result.tool_call_log.iter().next().unwrap().arguments["query"], "port facility use fee");
    }

    #[tokio::test]
    async fn unknown_tool_does_not_stop_the_loop() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            &tool_calls_reply(&[
                ("search_everything", serde_json::json!({})),
                legal_call(),
            ]),
            &content_reply("answer"),
        ]));
        let ql = query_loop(provider, registry_over(corpus().await));

        let result = ql.process_query("q").await;
        assert_eq!(result.answer, "answer");
        let entries: Vec<_> = result.tool_call_log.iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].outcome, ToolOutcome::failed("unknown tool: search_everything"));
        assert!(!entries[1].outcome.is_failed());
    }

    #[tokio::test]
    async fn malformed_output_is_the_answer() {
        let provider = Arc::new(SequentialMockProvider::texts(&["Plain prose with no JSON at all."]));
        let ql = query_loop(provider, registry_over(corpus().await));
        let result = ql.process_query("q").await;
        assert_eq!(result.answer, "Plain prose with no JSON at all.");
        assert_eq!(result.iteration_count, 1);
    }

    #[tokio::test]
    async fn iterations_never_exceed_budget_plus_one() {
        for budget in 1..=4u32 {
            let replies: Vec<String> = (0..=budget).map(|_| tool_calls_reply(&[legal_call()])).collect();
            let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
            let provider = Arc::new(SequentialMockProvider::texts(&refs));
            let ql = query_loop(provider.clone(), registry_over(corpus().await)).with_iteration_budget(budget);

            let result = ql.process_query("q").await;
            assert_eq!(result.iteration_count, budget + 1);
            assert_eq!(provider.call_count() as u32, budget + 1);
        }
    }

    #[tokio::test]
    async fn panicking_tool_is_catastrophic() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(PanickingTool));
        let provider = Arc::new(SequentialMockProvider::texts(&[&tool_calls_reply(&[legal_call()])]));
        let ql = query_loop(provider, Arc::new(registry));

        let result = ql.process_query("q").await;
        assert_eq!(result.answer, SYSTEM_ERROR_MESSAGE);
        assert_eq!(result.iteration_count, 0);
        assert!(result.tool_call_log.is_empty());
        assert!(result.is_catastrophic());
    }

    #[tokio::test]
    async fn custom_system_prompt_is_sent() {
        let provider = Arc::new(SequentialMockProvider::texts(&[&content_reply("ok")]));
        let ql = query_loop(provider.clone(), registry_over(corpus().await))
            .with_system_prompt("You only answer about Busan port.");
        ql.process_query("q").await;
        assert!(provider.prompts()[0].starts_with("# System instructions:\nYou only answer about Busan port."));
    }

    #[tokio::test]
    async fn session_history_is_replayed_and_committed() {
        let history = Arc::new(SessionHistory::new(10, 100));
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(content_reply("Berth 7.")),
            Err(rate_limited()),
            Ok(content_reply("Yes, with a pilot.")),
        ]));
        let ql = query_loop(provider.clone(), registry_over(corpus().await))
            .with_session_history(history.clone());

        ql.process_in_session(Some("s1"), "Which berth for tankers?").await;
        assert_eq!(history.turn_count("s1").await, 1);

        // Error answers are not committed.
        let failed = ql.process_in_session(Some("s1"), "Can I enter at night?").await;
        assert_eq!(failed.answer, RATE_LIMIT_MESSAGE);
        assert_eq!(history.turn_count("s1").await, 1);

        ql.process_in_session(Some("s1"), "Can I enter at night?").await;
        assert_eq!(history.turn_count("s1").await, 2);

        let third = &provider.prompts()[2];
        assert!(third.contains("# User question:\nWhich berth for tankers?\n\n# Previous answer:\nBerth 7."));
        assert!(!third.contains(RATE_LIMIT_MESSAGE));
    }

    #[tokio::test]
    async fn without_history_sessions_are_ignored() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            &content_reply("first"),
            &content_reply("second"),
        ]));
        let ql = query_loop(provider.clone(), registry_over(corpus().await));
        ql.process_in_session(Some("s1"), "one").await;
        ql.process_in_session(Some("s1"), "two").await;
        assert!(!provider.prompts()[1].contains("# Previous answer:"));
    }
}
