use async_trait::async_trait;
use thiserror::Error;

use crate::messages::{Message, ToolCall};
use crate::tools::ToolDescriptor;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("model returned a malformed response: {message}")]
    MalformedResponse { message: String },
}

/// What the model produced for one completion: a natural-language reply,
/// zero or more requested tool calls, or both.
#[derive(Clone, Debug, PartialEq)]
pub struct AssistantTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantTurn {
    pub fn answer(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn into_message(self) -> Message {
        Message::Assistant { content: self.content, tool_calls: self.tool_calls }
    }
}

/// Opaque model boundary: any backend that maps a transcript plus capability
/// descriptions to an assistant turn slots in without touching the
/// orchestrator.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<AssistantTurn, ModelError>;
}
