//! # Paimon Server
//!
//! HTTP API server exposing the assistant over JSON and Server-Sent Events.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod server;

pub use server::{AppState, Server, ServerConfig};
