//! # Paimon OpenAI
//!
//! Clients for OpenAI-compatible HTTP APIs.
//!
//! - [`OpenAiChatModel`] speaks `/chat/completions`, both as a single JSON
//!   response and as a Server-Sent Events stream, including tool calls and
//!   structured `response_format` requests.
//! - [`OpenAiEmbedder`] speaks `/embeddings`.
//!
//! Any server implementing the same surface (vLLM, Ollama, DashScope
//! compatible mode, ...) works by pointing `base_url` at it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod client;
pub mod embedding;
mod wire;

pub use chat::OpenAiChatModel;
pub use client::{OpenAiClient, OpenAiConfig};
pub use embedding::OpenAiEmbedder;
