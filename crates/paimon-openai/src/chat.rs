//! Chat completions over an OpenAI-compatible API.

use async_trait::async_trait;
use futures::StreamExt;
use paimon_core::{
    ChatModel, ChatRequest, ChatResponse, ChatStream, Error, FinishReason, ModelId, Result,
    SamplingParams, StreamChunk,
};

use crate::client::{OpenAiClient, OpenAiConfig};
use crate::wire::{build_chat_payload, ChunkAssembler, CompletionResponse, SseDecoder};

/// A chat model served behind `/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: OpenAiClient,
    model: ModelId,
    defaults: SamplingParams,
}

impl OpenAiChatModel {
    /// Creates a chat model for `model` on the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &OpenAiConfig, model: impl Into<ModelId>) -> Result<Self> {
        Ok(Self::with_client(OpenAiClient::new(config)?, model))
    }

    /// Creates a chat model sharing an existing client.
    pub fn with_client(client: OpenAiClient, model: impl Into<ModelId>) -> Self {
        Self {
            client,
            model: model.into(),
            defaults: SamplingParams::default(),
        }
    }

    /// Sets sampling defaults applied when a request leaves a value unset.
    #[must_use]
    pub fn with_default_sampling(mut self, defaults: SamplingParams) -> Self {
        self.defaults = defaults;
        self
    }

    fn model_for<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        request.model.as_ref().unwrap_or(&self.model).0.as_str()
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let model = self.model_for(&request).to_string();
        let payload = build_chat_payload(&request, &model, &self.defaults, false);

        let response = self.client.post_json("/chat/completions", &payload).await?;
        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::backend("openai", format!("invalid completion body: {e}")))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::backend("openai", "no choices returned"))?;

        let usage = body.usage.map(Into::into).unwrap_or_default();
        tracing::debug!(
            request_id = %request.request_id,
            finish_reason = ?choice.finish_reason,
            "Chat completion finished"
        );

        Ok(ChatResponse {
            request_id: request.request_id,
            model: ModelId::new(body.model.unwrap_or(model)),
            finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
            message: choice.message.into_message(),
            usage,
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let payload = build_chat_payload(&request, self.model_for(&request), &self.defaults, true);
        let response = self.client.post_json("/chat/completions", &payload).await?;

        let client = self.client.clone();
        let mut bytes = response.bytes_stream();

        // Dropping the returned stream drops `bytes`, which closes the connection.
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::default();
            let mut assembler = ChunkAssembler::default();
            let mut done = false;

            'read: while let Some(next) = bytes.next().await {
                let data = match next {
                    Ok(data) => data,
                    Err(e) => {
                        yield Err(client.map_transport(&e));
                        return;
                    }
                };

                for event in decoder.push(&data) {
                    if event == "[DONE]" {
                        done = true;
                        break 'read;
                    }
                    match assembler.feed(&event) {
                        Ok(Some(chunk)) => yield Ok(chunk),
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, data = %event, "Skipping malformed stream event"),
                    }
                }
            }

            if !done {
                if let Some(event) = decoder.finish() {
                    done = event == "[DONE]";
                    if !done {
                        if let Ok(Some(chunk)) = assembler.feed(&event) {
                            yield Ok(chunk);
                        }
                    }
                }
            }

            if !assembler.is_finished() {
                if done {
                    yield Ok(StreamChunk::finish(FinishReason::Stop));
                } else {
                    yield Err(Error::backend("openai", "stream ended before completion"));
                }
            }
        };

        Ok(ChatStream::new(stream))
    }

    fn model_id(&self) -> &ModelId {
        &self.model
    }
}
