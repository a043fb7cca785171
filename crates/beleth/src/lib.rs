//! # Beleth
//!
//! *"The King commands legions"*
//!
//! Beleth is the assistant framework for Paimon,
//! composing a chat model with retrieval, memory, tools and guardrails.
//!
//! ## Features
//!
//! - **Assistant**: Synchronous, structured and streaming chat
//! - **Memory**: Per-conversation sliding message windows
//! - **Tool System**: Static tools, dynamic providers and a bounded tool loop
//! - **MCP**: Tools served by a Model Context Protocol server
//! - **Guardrails**: Input checks before any model call
//! - **Reports**: Schema-constrained structured output

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assistant;
pub mod guardrail;
pub mod interview;
pub mod mcp;
pub mod memory;
pub mod report;
pub mod tool;

pub use assistant::{Assistant, AssistantBuilder, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_SYSTEM_PROMPT};
pub use guardrail::{GuardrailConfig, GuardrailResult, InputGuardrail, SafeInputGuardrail};
pub use interview::{InterviewQuestionConfig, InterviewQuestionTool};
pub use mcp::{McpClient, McpConfig, McpToolInfo, McpToolProvider, MCP_PROTOCOL_VERSION};
pub use memory::{ChatMemoryStore, MemorySession, MessageWindowMemory, DEFAULT_MAX_MESSAGES};
pub use report::Report;
pub use tool::{Tool, ToolContext, ToolProvider, ToolRegistry, ToolResult};
