//! The query loop for the harbor assistant.
//!
//! A query goes through a bounded **Decide → Dispatch** cycle:
//!
//! 1. **Seed** the conversation (system prompt, optional session history, query)
//! 2. **Decide**: render the prompt, call the model, interpret the output
//! 3. **If tool calls**: run them in order, append the results, decide again
//! 4. **If text**: that is the answer
//!
//! When the iteration budget runs out the model is asked once more, without
//! tools, to synthesize an answer from what it has.

pub mod assembler;
pub mod builder;
pub mod history;
pub mod json_extract;
pub mod loop_runner;
pub mod model_gateway;
pub mod prompt;
pub mod retry;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use assembler::{AssembledAnswer, DetailedToolCall, ToolCallSummary, detailed_calls, unwrap_answer};
pub use builder::build_query_loop;
pub use history::SessionHistory;
pub use loop_runner::{CONVERGENCE_FAILURE_MESSAGE, QueryLoop, SYSTEM_ERROR_MESSAGE};
pub use model_gateway::{BACKEND_ERROR_MESSAGE, ModelGateway, RATE_LIMIT_MESSAGE};
pub use retry::RetryPolicy;
