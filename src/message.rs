//! Conversation messages exchanged between the agent, the model and the tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Output of a tool, linked back to the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub output: Value,
}

/// One tagged piece of a message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSegment {
    Text { text: String },
    Reasoning { text: String },
    ToolUse(ToolCall),
    ToolResult(ToolResult),
}

impl ContentSegment {
    pub fn text(text: impl Into<String>) -> Self {
        ContentSegment::Text { text: text.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContentSegment::Text { .. } => "text",
            ContentSegment::Reasoning { .. } => "reasoning",
            ContentSegment::ToolUse(_) => "tool_use",
            ContentSegment::ToolResult(_) => "tool_result",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentSegment::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentSegment>,
}

impl Message {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            content: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System).with_text(text)
    }

    /// The prompt is kept verbatim, including when it is empty.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User).with_text(text)
    }

    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    pub fn tool(result: ToolResult) -> Self {
        Self::new(Role::Tool).with_content(ContentSegment::ToolResult(result))
    }

    pub fn with_content(mut self, segment: ContentSegment) -> Self {
        self.content.push(segment);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_content(ContentSegment::text(text))
    }

    pub fn with_tool_call(self, call: ToolCall) -> Self {
        self.with_content(ContentSegment::ToolUse(call))
    }

    /// All text segments joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentSegment::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|segment| match segment {
            ContentSegment::ToolUse(call) => Some(call),
            _ => None,
        })
    }
}
