//! Tool trait — the abstraction over retrieval capabilities.
//!
//! Tools are what let the model look things up: search the legal corpus,
//! search the procedural manuals. The registry hands their definitions to the
//! model gateway and dispatches the calls the model asks for.
//!
//! Dispatch never fails from the caller's point of view: an unknown name or a
//! tool error becomes a `ToolOutcome::Failed` that is shown to the model like
//! any other result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ToolError;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Integer => "integer",
            ParameterKind::Number => "number",
            ParameterKind::Boolean => "boolean",
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// A tool definition shown to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// Parameters in declaration order
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDefinition {
    /// Render the parameters as a JSON Schema object.
    pub fn json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                serde_json::json!({ "type": p.kind.as_str(), "description": p.description }),
            );
            if p.required {
                required.push(serde_json::Value::String(p.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A request from the model to run a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Name of the tool to execute
    pub tool_name: String,

    /// Arguments exactly as the model supplied them
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolInvocationRequest {
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// A retrieved passage as the model sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageView {
    pub content: String,
    pub source_file: String,
}

/// What a tool invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    /// The tool ran. `results` may be empty.
    Found {
        message: String,
        results: Vec<PassageView>,
    },
    /// The tool could not run.
    Failed { error: String },
}

impl ToolOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        ToolOutcome::Failed { error: error.into() }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ToolOutcome::Failed { .. })
    }

    /// Source of the first passage, if any.
    pub fn first_source(&self) -> Option<&str> {
        match self {
            ToolOutcome::Found { results, .. } => results.first().map(|r| r.source_file.as_str()),
            ToolOutcome::Failed { .. } => None,
        }
    }
}

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub tool_name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    pub outcome: ToolOutcome,
}

/// Every tool call made while answering one query, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolCallLog(Vec<ToolInvocationResult>);

impl ToolCallLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, entry: ToolInvocationResult) {
        self.0.push(entry);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ToolInvocationResult> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a ToolCallLog {
    type Item = &'a ToolInvocationResult;
    type IntoIter = std::slice::Iter<'a, ToolInvocationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The core Tool trait.
///
/// Each retrieval capability implements this trait. Tools are registered in
/// the ToolRegistry and made available to the query loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search_legal_documents").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Parameters this tool accepts, in display order.
    fn parameters(&self) -> Vec<ParameterSpec>;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<ToolOutcome, ToolError>;

    /// Convert this tool into a ToolDefinition for the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// A registry of available tools.
///
/// The query loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Look up and execute tools when the model requests them
///
/// Registration order is kept so the rendered catalog is stable.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name in place.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Get all tool definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call, folding every failure into the outcome.
    pub async fn dispatch(&self, request: &ToolInvocationRequest) -> ToolOutcome {
        let Some(tool) = self.get(&request.tool_name) else {
            tracing::warn!(tool = %request.tool_name, "Model requested an unknown tool");
            return ToolOutcome::failed(format!("unknown tool: {}", request.tool_name));
        };

        match tool.execute(&request.arguments).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = match e {
                    ToolError::ExecutionFailed { reason, .. } => reason,
                    ToolError::InvalidArguments(reason) => reason,
                };
                tracing::warn!(tool = %request.tool_name, %reason, "Tool execution failed");
                ToolOutcome::failed(format!("tool execution failed: {reason}"))
            }
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
