//! Request types for chat completion.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sampling::SamplingParams;
use crate::types::{Message, ModelId, RequestId, ToolDefinition};

/// Output format the model is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free text.
    Text,
    /// Any JSON object.
    JsonObject,
    /// JSON conforming to the given schema.
    JsonSchema {
        /// Schema name.
        name: String,
        /// JSON schema document.
        schema: Value,
        /// Whether the backend must enforce the schema strictly.
        #[serde(default)]
        strict: bool,
    },
}

/// Request for a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Unique request identifier.
    #[serde(default)]
    pub request_id: RequestId,

    /// Model to use; the backend default when absent.
    #[serde(default)]
    pub model: Option<ModelId>,

    /// Conversation so far, system prompt first.
    pub messages: Vec<Message>,

    /// Tools the model may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Requested output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    /// Sampling parameters.
    #[serde(default)]
    pub sampling: SamplingParams,
}

impl ChatRequest {
    /// Creates a new chat request over the given messages.
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            request_id: RequestId::new(),
            model: None,
            messages,
            tools: Vec::new(),
            response_format: None,
            sampling: SamplingParams::default(),
        }
    }

    /// Sets the model to use.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<ModelId>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Declares the tools available to the model.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the response format.
    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Sets the sampling parameters.
    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// Returns the content of the last user message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::User)
            .map(|m| m.content.as_str())
    }
}
