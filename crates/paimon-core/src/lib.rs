//! # Paimon Core
//!
//! Core types and traits for the Paimon assistant.
//!
//! This crate provides the foundational abstractions used across all Paimon components:
//! - Common error types
//! - Conversation messages, tool calls and tool declarations
//! - Chat request/response structures and structured-output formats
//! - The [`ChatModel`] trait implemented by model backends
//! - Streaming wrappers for model chunks and assistant text

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod model;
pub mod request;
pub mod response;
pub mod sampling;
pub mod streaming;
pub mod types;

pub use error::{Error, Result};
pub use model::ChatModel;
pub use request::{ChatRequest, ResponseFormat};
pub use response::ChatResponse;
pub use sampling::SamplingParams;
pub use streaming::{ChatStream, StreamAccumulator, StreamChunk, TextStream};
pub use types::*;
