//! Streaming types for real-time chat output.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::response::ChatResponse;
use crate::types::{FinishReason, Message, ToolCall, Usage};

/// A chunk in a streaming chat response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// New text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,

    /// Completed tool calls (emitted once all their arguments arrived).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Finish reason (only present when done).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Usage (only present in final chunk).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// Creates a chunk with text content.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            delta: Some(content.into()),
            ..Self::default()
        }
    }

    /// Creates a final chunk carrying the finish reason.
    #[must_use]
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Self::default()
        }
    }
}

/// A stream of chat chunks produced by a model backend.
pub struct ChatStream {
    inner: Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>,
}

impl ChatStream {
    /// Creates a new `ChatStream` from a stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<StreamChunk>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Creates an empty stream.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(futures::stream::empty())
    }

    /// Replays a complete response as a stream.
    ///
    /// Used by backends without native streaming.
    #[must_use]
    pub fn from_response(response: ChatResponse) -> Self {
        let mut chunks = Vec::with_capacity(2);
        if !response.message.content.is_empty() || !response.message.tool_calls.is_empty() {
            chunks.push(Ok(StreamChunk {
                delta: Some(response.message.content).filter(|c| !c.is_empty()),
                tool_calls: response.message.tool_calls,
                finish_reason: None,
                usage: None,
            }));
        }
        chunks.push(Ok(StreamChunk {
            finish_reason: Some(response.finish_reason.unwrap_or(FinishReason::Stop)),
            usage: Some(response.usage),
            ..StreamChunk::default()
        }));
        Self::new(futures::stream::iter(chunks))
    }

    /// Collects all chunks into a vector.
    ///
    /// # Errors
    ///
    /// Returns an error if any chunk fails.
    pub async fn collect(self) -> Result<Vec<StreamChunk>> {
        use futures::StreamExt;
        let mut chunks = Vec::new();
        let mut stream = self;
        while let Some(result) = stream.next().await {
            chunks.push(result?);
        }
        Ok(chunks)
    }

    /// Collects all text into a single string.
    ///
    /// # Errors
    ///
    /// Returns an error if any chunk fails.
    pub async fn collect_text(self) -> Result<String> {
        let chunks = self.collect().await?;
        let mut text = String::new();
        for chunk in chunks {
            if let Some(content) = chunk.delta {
                text.push_str(&content);
            }
        }
        Ok(text)
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Folds streamed chunks back into a complete assistant message.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl StreamAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a chunk.
    pub fn push(&mut self, chunk: &StreamChunk) {
        if let Some(delta) = &chunk.delta {
            self.content.push_str(delta);
        }
        self.tool_calls.extend(chunk.tool_calls.iter().cloned());
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
        if let Some(usage) = &chunk.usage {
            self.usage.accumulate(usage);
        }
    }

    /// Returns true once a finish reason has been seen.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Returns the finish reason seen so far.
    #[must_use]
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Returns the accumulated usage.
    #[must_use]
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    /// Builds the assistant message.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::assistant_tool_calls(self.content, self.tool_calls)
    }
}

/// A stream of assistant text chunks.
///
/// Dropping the stream cancels the producer behind it.
pub struct TextStream {
    inner: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl TextStream {
    /// Creates a new `TextStream` from a stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Collects the whole stream into one string.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by the stream.
    pub async fn collect_text(self) -> Result<String> {
        use futures::StreamExt;
        let mut text = String::new();
        let mut stream = self;
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

impl Stream for TextStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
