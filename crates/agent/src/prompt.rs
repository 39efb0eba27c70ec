//! Prompt rendering.
//!
//! The model API takes one text prompt, so the conversation is flattened
//! into role sections. When tools are offered, the catalog and the JSON
//! output contract are appended after the conversation.

use harbor_core::message::{ConversationMessage, Role};
use harbor_core::tool::ToolDefinition;

/// Persona and grounding rules for the harbor assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an expert assistant for Korean harbor and port regulations. Your job is to understand \
the user's question, use the available tools to find relevant information, and combine the \
results into a complete answer.

# Answer rules
1. Base your answer first and foremost on the information found through the tools.
2. If the information found by the tools is insufficient or unrelated to the question, state \
explicitly: \"The provided documents did not contain relevant information.\"
3. Only after that statement may you add, for reference, an answer based on your general knowledge.

Always respond only in the required JSON format.";

/// Final instruction sent when the iteration budget is spent.
pub const SYNTHESIS_INSTRUCTION: &str = "\
Combine all tool results gathered so far into a final answer to the user's original question \
and put it in the 'content' field of a JSON object. You can no longer call tools. If the \
information is insufficient, answer from what has been confirmed so far together with your \
own knowledge.";

const OUTPUT_CONTRACT: &str = r#"# Instructions:
- If you need tools to answer the user's question, produce exactly one JSON object in the following format and no other text:
{
  "reasoning": "A short thought on why these tools were chosen.",
  "tool_calls": [
    {
      "function_name": "name of the tool to call",
      "arguments": {"parameter": "value"}
    }
  ]
}
- If no tool is needed, produce exactly one JSON object in the following format:
{
  "reasoning": "A short thought about the answer.",
  "content": "The final answer shown to the user."
}
"#;

fn section_header(role: Role) -> &'static str {
    match role {
        Role::System => "# System instructions:",
        Role::User => "# User question:",
        Role::Assistant => "# Previous answer:",
        Role::Tool => "# Tool results:",
    }
}

/// Render the tool catalog, one block per tool.
pub fn format_catalog(tools: &[ToolDefinition]) -> String {
    tools
        .iter()
        .map(|tool| {
            let mut block = format!("• {}: {}", tool.name, tool.description);
            for p in &tool.parameters {
                block.push_str(&format!("\n  - {} ({}): {}", p.name, p.kind.as_str(), p.description));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Flatten the conversation (and optional catalog) into one prompt.
pub fn render(conversation: &[ConversationMessage], tools: Option<&[ToolDefinition]>) -> String {
    let mut prompt = String::new();
    for msg in conversation {
        prompt.push_str(section_header(msg.role));
        prompt.push('\n');
        prompt.push_str(&msg.content);
        prompt.push_str("\n\n");
    }

    if let Some(tools) = tools {
        prompt.push_str("# Available tools:\n");
        prompt.push_str(&format_catalog(tools));
        prompt.push_str("\n\n");
        prompt.push_str(OUTPUT_CONTRACT);
    }

    prompt
}
