//! What the model decided to do on one turn.

use serde::{Deserialize, Serialize};
use crate::tool::ToolInvocationRequest;

/// Why a model call produced no usable decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionErrorKind {
    /// The backend is throttling requests
    RateLimited,
    /// Any other backend failure, including timeouts
    Backend,
}

/// The interpreted result of one model call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDecision {
    /// Run these tools, in order. Never empty.
    ToolCalls(Vec<ToolInvocationRequest>),
    /// Answer text, possibly the raw model output when it was not JSON.
    Text(String),
    /// The call failed; `message` is already user-facing.
    Error {
        kind: DecisionErrorKind,
        message: String,
    },
}
