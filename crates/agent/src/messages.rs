use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One model-requested capability invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A single turn in a conversation transcript.
///
/// `System` turns are ephemeral: the orchestrator injects them per invocation
/// and the conversation store never persists them. A `ToolResult` always
/// answers a `ToolCall` carried by an earlier `Assistant` turn in the same
/// transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
    System {
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult { tool_call_id: tool_call_id.into(), content: content.into() }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::User { content }
            | Self::Assistant { content, .. }
            | Self::ToolResult { content, .. }
            | Self::System { content } => content,
        }
    }

    pub fn is_persistable(&self) -> bool {
        matches!(self, Self::User { .. } | Self::Assistant { .. })
    }
}
