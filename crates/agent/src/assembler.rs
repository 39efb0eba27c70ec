//! Shapes a `QueryResult` into what callers return to users.

use harbor_core::query::QueryResult;
use harbor_core::tool::ToolOutcome;
use serde::{Deserialize, Serialize};

/// If `text` is a JSON object with a `content` key, return that content.
/// Otherwise return `text` unchanged.
pub fn unwrap_answer(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text.trim()) {
        Ok(serde_json::Value::Object(obj)) => match obj.get("content") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => text.to_string(),
        },
        _ => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub tool: String,
    pub source_file: Option<String>,
}

/// A tool call with its full arguments and outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedToolCall {
    pub tool: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    pub result: ToolOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledAnswer {
    pub answer: String,
    pub tool_calls: Vec<ToolCallSummary>,
    pub iterations: u32,
    pub success: bool,
}

impl AssembledAnswer {
    pub fn from_result(result: &QueryResult) -> Self {
        Self {
            answer: unwrap_answer(&result.answer),
            tool_calls: result
                .tool_call_log
                .iter()
                .map(|entry| ToolCallSummary {
                    tool: entry.tool_name.clone(),
                    source_file: entry.outcome.first_source().map(str::to_string),
                })
                .collect(),
            iterations: result.iteration_count,
            success: !result.is_catastrophic(),
        }
    }
}

pub fn detailed_calls(result: &QueryResult) -> Vec<DetailedToolCall> {
    result
        .tool_call_log
        .iter()
        .map(|entry| DetailedToolCall {
            tool: entry.tool_name.clone(),
            arguments: entry.arguments.clone(),
            result: entry.outcome.clone(),
        })
        .collect()
}
