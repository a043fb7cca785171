//! Response types for chat completion.

use serde::{Deserialize, Serialize};

use crate::types::{FinishReason, Message, ModelId, RequestId, ToolCall, Usage};

/// Response from a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Request identifier.
    pub request_id: RequestId,

    /// Model used for generation.
    pub model: ModelId,

    /// The assistant message, possibly carrying tool calls.
    pub message: Message,

    /// Reason generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Token usage statistics.
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// Creates a response carrying a plain assistant reply.
    #[must_use]
    pub fn text(request_id: RequestId, model: ModelId, text: impl Into<String>) -> Self {
        Self {
            request_id,
            model,
            message: Message::assistant(text),
            finish_reason: Some(FinishReason::Stop),
            usage: Usage::default(),
        }
    }

    /// Creates a response requesting tool calls.
    #[must_use]
    pub fn tool_calls(request_id: RequestId, model: ModelId, calls: Vec<ToolCall>) -> Self {
        Self {
            request_id,
            model,
            message: Message::assistant_tool_calls(String::new(), calls),
            finish_reason: Some(FinishReason::ToolCalls),
            usage: Usage::default(),
        }
    }

    /// Returns the reply text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.message.content
    }

    /// Returns the tool calls requested by the model.
    #[must_use]
    pub fn requested_tools(&self) -> &[ToolCall] {
        &self.message.tool_calls
    }
}
