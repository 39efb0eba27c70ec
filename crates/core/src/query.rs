//! The outcome of answering one query.

use serde::{Deserialize, Serialize};
use crate::tool::ToolCallLog;

/// Final answer plus everything the loop did to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// User-facing answer text
    pub answer: String,

    /// Tool calls made, in execution order
    pub tool_call_log: ToolCallLog,

    /// Number of model calls made; 0 only when the loop itself failed
    pub iteration_count: u32,
}

impl QueryResult {
    /// Whether the loop failed before producing any answer of its own.
    pub fn is_catastrophic(&self) -> bool {
        self.iteration_count == 0
    }
}
