//! The chat model boundary.

use async_trait::async_trait;

use crate::error::Result;
use crate::request::ChatRequest;
use crate::response::ChatResponse;
use crate::streaming::ChatStream;
use crate::types::ModelId;

/// Trait implemented by chat-completion backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generates a single completion for the request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Generates a completion as a stream of chunks.
    ///
    /// The default implementation replays [`ChatModel::chat`] as a stream.
    /// Dropping the returned stream must release the underlying connection.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let response = self.chat(request).await?;
        Ok(ChatStream::from_response(response))
    }

    /// Returns the model identifier used when a request names none.
    fn model_id(&self) -> &ModelId;
}
