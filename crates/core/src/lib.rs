//! # Harbor Core
//!
//! Domain types, traits, and error definitions for the Harbor regulatory
//! question-answering service. This crate has **no framework dependencies**:
//! it defines the model that the retrieval, provider, tool, and agent crates
//! implement against.
//!
//! The two external capabilities of the system are traits here:
//! - [`Provider`] — a language-model backend that turns a prompt into text
//! - [`DocumentStore`] — a vector-similarity store holding named collections
//!
//! Everything the query loop owns per request (conversation, tool call log,
//! decisions, final result) is a plain value type.

pub mod decision;
pub mod error;
pub mod message;
pub mod provider;
pub mod query;
pub mod retrieval;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use decision::{DecisionErrorKind, ModelDecision};
pub use error::{Error, ProviderError, RetrievalError, ToolError};
pub use message::{ConversationMessage, Role};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, GenerationConfig, Provider, ProviderRequest,
    ProviderResponse, Usage,
};
pub use query::QueryResult;
pub use retrieval::{DocumentStore, MetadataFilter, SearchPassage, SearchRequest};
pub use tool::{
    ParameterKind, ParameterSpec, PassageView, Tool, ToolCallLog, ToolDefinition,
    ToolInvocationRequest, ToolInvocationResult, ToolOutcome, ToolRegistry,
};
