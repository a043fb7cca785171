//! Tools served by a Model Context Protocol server.
//!
//! The client speaks JSON-RPC over the streamable HTTP transport: every call
//! is a `POST` to one endpoint, and the server answers either with a JSON
//! body or with a short event stream carrying the reply.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use paimon_core::{Error, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::tool::{Tool, ToolContext, ToolProvider, ToolResult};

/// Protocol revision requested during the handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

const SESSION_HEADER: &str = "mcp-session-id";
const BACKEND: &str = "mcp";

/// Settings for [`McpToolProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Whether tools from the server are offered to the model.
    pub enabled: bool,
    /// Endpoint URL, e.g. `http://localhost:3000/mcp`.
    pub url: String,
    /// Bearer token sent with every call.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

// === JSON-RPC ===

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// A tool advertised by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolInfo {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema of the arguments.
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Deserialize)]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<McpToolInfo>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolResult {
    #[serde(default)]
    content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    is_error: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentItem {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl CallToolResult {
    fn into_tool_result(self) -> ToolResult {
        let text = self
            .content
            .into_iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text),
                ContentItem::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if !self.is_error {
            ToolResult::success(text)
        } else if text.is_empty() {
            ToolResult::error("the tool server reported an error")
        } else {
            ToolResult::error(text)
        }
    }
}

/// Picks the reply to request `id` out of an event-stream body.
fn find_event_reply(body: &str, id: u64) -> Result<JsonRpcResponse> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data.trim()).ok())
        .find(|reply| reply.id.as_ref().and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| Error::backend(BACKEND, "event stream ended without a reply"))
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::backend(BACKEND, format!("unexpected {method} reply: {e}")))
}

// === Client ===

/// JSON-RPC client for one MCP server.
///
/// The handshake runs lazily on first use and is retried after a failure.
#[derive(Debug)]
pub struct McpClient {
    http: reqwest::Client,
    config: McpConfig,
    next_id: AtomicU64,
    session: OnceCell<Option<String>>,
}

impl McpClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is configured or the HTTP client cannot be
    /// built.
    pub fn new(config: McpConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::invalid_config("mcp url is required"));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::invalid_config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            next_id: AtomicU64::new(1),
            session: OnceCell::new(),
        })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Lists every tool the server offers, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or replies with an error.
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = decode("tools/list", self.call("tools/list", params).await?)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    /// Invokes a tool. A tool-level failure is an error [`ToolResult`].
    ///
    /// # Errors
    ///
    /// Returns an error if the call itself fails.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let params = json!({ "name": name, "arguments": arguments });
        let result: CallToolResult = decode("tools/call", self.call("tools/call", Some(params)).await?)?;
        Ok(result.into_tool_result())
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let session = self.session.get_or_try_init(|| self.initialize()).await?;
        let (result, _) = self.post(method, params, session.as_deref()).await?;
        Ok(result)
    }

    async fn initialize(&self) -> Result<Option<String>> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "paimon",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let (result, session) = self.post("initialize", Some(params), None).await?;

        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method: "notifications/initialized",
            params: None,
        };
        self.send(&body, session.as_deref()).await?;

        tracing::info!(
            url = %self.config.url,
            protocol = result.get("protocolVersion").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            session = session.as_deref().unwrap_or("none"),
            "MCP session initialized"
        );
        Ok(session)
    }

    /// Sends one call; returns its result and any session id the server set.
    async fn post(
        &self,
        method: &str,
        params: Option<Value>,
        session: Option<&str>,
    ) -> Result<(Value, Option<String>)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };
        let response = self.send(&body, session).await?;

        let assigned = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let text = response
            .text()
            .await
            .map_err(|e| Error::backend(BACKEND, format!("{method}: {e}")))?;
        let reply = if event_stream {
            find_event_reply(&text, id)?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&text)
                .map_err(|e| Error::backend(BACKEND, format!("{method}: invalid reply: {e}")))?
        };

        if let Some(error) = reply.error {
            return Err(Error::backend(
                BACKEND,
                format!("{method} failed ({}): {}", error.code, error.message),
            ));
        }
        Ok((reply.result.unwrap_or(Value::Null), assigned))
    }

    async fn send(
        &self,
        body: &JsonRpcRequest<'_>,
        session: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .post(&self.config.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    duration: Duration::from_secs(self.config.timeout_secs.max(1)),
                }
            } else {
                Error::backend(BACKEND, format!("{}: {e}", body.method))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::backend(
                BACKEND,
                format!("{} returned {status}", body.method),
            ));
        }
        Ok(response)
    }
}

// === Provider ===

/// A tool executed remotely through an [`McpClient`].
struct McpTool {
    client: Arc<McpClient>,
    info: McpToolInfo,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        self.info.description.as_deref().unwrap_or_default()
    }

    fn parameters_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let arguments = if params.is_null() { json!({}) } else { params };
        tracing::debug!(tool = %self.info.name, "Calling MCP tool");
        self.client.call_tool(&self.info.name, arguments).await
    }
}

/// Offers the tools of an MCP server, listed afresh for every request.
pub struct McpToolProvider {
    client: Arc<McpClient>,
}

impl McpToolProvider {
    /// Creates a provider for the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new(config: McpConfig) -> Result<Self> {
        Ok(Self {
            client: Arc::new(McpClient::new(config)?),
        })
    }

    /// Returns the underlying client.
    #[must_use]
    pub fn client(&self) -> &Arc<McpClient> {
        &self.client
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    async fn provide(&self, _ctx: &ToolContext) -> Result<Vec<Arc<dyn Tool>>> {
        let tools = self.client.list_tools().await?;
        tracing::debug!(url = %self.client.url(), count = tools.len(), "MCP tools listed");

        Ok(tools
            .into_iter()
            .map(|info| {
                Arc::new(McpTool {
                    client: self.client.clone(),
                    info,
                }) as Arc<dyn Tool>
            })
            .collect())
    }
}
