//! HTTP server exposing the assistant.
//!
//! JSON endpoints for synchronous and structured chat, and a Server-Sent
//! Events endpoint for streaming chat.

use std::borrow::Cow;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use beleth::Assistant;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use paimon_core::{ConversationId, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stolas::IngestStatus;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Enable permissive CORS.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            cors: true,
        }
    }
}

impl ServerConfig {
    /// Resolves the listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::invalid_config(format!("server address: {e}")))
    }
}

/// Shared application state.
pub struct AppState {
    /// The assistant serving requests.
    pub assistant: Assistant,
    /// Outcome of startup ingestion.
    pub knowledge: IngestStatus,
    /// Server start time.
    pub start_time: Instant,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    ready: AtomicBool,
}

impl AppState {
    /// Creates new app state.
    #[must_use]
    pub fn new(assistant: Assistant, knowledge: IngestStatus) -> Self {
        Self {
            assistant,
            knowledge,
            start_time: Instant::now(),
            started_at: Utc::now(),
            ready: AtomicBool::new(false),
        }
    }

    /// Returns true once the server accepts traffic.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

/// The HTTP server.
pub struct Server {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl Server {
    /// Creates a server over an assistant whose knowledge base is already
    /// ingested.
    #[must_use]
    pub fn new(config: ServerConfig, assistant: Assistant, knowledge: IngestStatus) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(assistant, knowledge)),
        }
    }

    /// Returns the shared state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Creates the router.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/api/status", get(server_status))
            .route("/api/ai/chat", post(chat))
            .route("/api/ai/report", post(report))
            .route("/api/ai/chat/stream", get(chat_stream))
            .with_state(self.state.clone());

        router = router.layer(TraceLayer::new_for_http());

        if self.config.cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Binds the configured address and serves until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the server fails.
    pub async fn run(self) -> Result<()> {
        let addr = self.config.addr()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(addr = %addr, "Starting Paimon server");
        eprintln!("\n\x1b[32m✓\x1b[0m Server listening on http://{addr}");
        eprintln!("  Press Ctrl+C to stop\n");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        eprintln!("\x1b[32m✓\x1b[0m Server stopped");
        Ok(())
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        self.state.ready.store(true, Ordering::Release);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            eprintln!("\n\x1b[33m⚡\x1b[0m Received Ctrl+C, shutting down gracefully...");
        },
        () = terminate => {
            eprintln!("\n\x1b[33m⚡\x1b[0m Received SIGTERM, shutting down gracefully...");
        },
    }
}

// === Error Response ===

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

impl ErrorResponse {
    fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.into(),
            },
        }
    }
}

fn error_response(status: StatusCode, message: &str, error_type: &str) -> Response {
    let body = Json(ErrorResponse::new(message, error_type));
    (status, body).into_response()
}

/// Maps an assistant error to an HTTP status and error type.
fn classify(error: &Error) -> (StatusCode, &'static str) {
    match error {
        Error::PolicyViolation { .. } => (StatusCode::BAD_REQUEST, "policy_violation"),
        Error::InvalidConfig { .. } => (StatusCode::BAD_REQUEST, "invalid_request_error"),
        Error::OutputParsing { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "output_parsing_error"),
        Error::Backend { .. } => (StatusCode::BAD_GATEWAY, "backend_error"),
        Error::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        Error::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        Error::Tool { .. } | Error::ToolLoopExceeded { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "tool_error")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

fn assistant_error(error: &Error) -> Response {
    let (status, error_type) = classify(error);
    if status.is_server_error() {
        tracing::error!(error = %error, "Assistant request failed");
    } else {
        tracing::debug!(error = %error, "Assistant request rejected");
    }
    error_response(status, &error.to_string(), error_type)
}

fn empty_message() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "message must not be empty",
        "invalid_request_error",
    )
}

// === Health Endpoints ===

async fn health() -> &'static str {
    "OK"
}

async fn ready(State(state): State<Arc<AppState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "Ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Starting").into_response()
    }
}

#[derive(Debug, Serialize)]
struct ServerStatus {
    status: String,
    started_at: DateTime<Utc>,
    uptime_seconds: u64,
    knowledge: Value,
    conversations: usize,
    tools: Vec<String>,
}

fn knowledge_json(status: &IngestStatus) -> Value {
    match status {
        IngestStatus::Ready {
            documents,
            segments,
        } => json!({ "state": "ready", "documents": documents, "segments": segments }),
        IngestStatus::Degraded { reason } => json!({ "state": "degraded", "reason": reason }),
    }
}

async fn server_status(State(state): State<Arc<AppState>>) -> Json<ServerStatus> {
    Json(ServerStatus {
        status: "running".to_string(),
        started_at: state.started_at,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        knowledge: knowledge_json(&state.knowledge),
        conversations: state.assistant.memory().conversations(),
        tools: state
            .assistant
            .tools()
            .list()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

// === Assistant Endpoints ===

/// Conversation identifier given as a JSON number or string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MemoryId {
    Number(i64),
    Text(String),
}

impl From<MemoryId> for ConversationId {
    fn from(id: MemoryId) -> Self {
        match id {
            MemoryId::Number(n) => ConversationId::from(n),
            MemoryId::Text(s) => ConversationId::from(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    memory_id: Option<MemoryId>,
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    memory_id: String,
    reply: String,
}

async fn chat(State(state): State<Arc<AppState>>, Json(body): Json<ChatBody>) -> Response {
    if body.message.trim().is_empty() {
        return empty_message();
    }
    let id = body.memory_id.map(ConversationId::from).unwrap_or_default();

    match state.assistant.chat(id.clone(), &body.message).await {
        Ok(reply) => Json(ChatReply {
            memory_id: id.to_string(),
            reply,
        })
        .into_response(),
        Err(e) => assistant_error(&e),
    }
}

#[derive(Debug, Deserialize)]
struct ReportBody {
    message: String,
}

async fn report(State(state): State<Arc<AppState>>, Json(body): Json<ReportBody>) -> Response {
    if body.message.trim().is_empty() {
        return empty_message();
    }

    match state.assistant.chat_for_report(&body.message).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => assistant_error(&e),
    }
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    memory_id: Option<String>,
    message: String,
}

async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Response {
    if query.message.trim().is_empty() {
        return empty_message();
    }
    let id = query
        .memory_id
        .map(ConversationId::from)
        .unwrap_or_default();

    let mut text = match state.assistant.chat_stream(id, &query.message).await {
        Ok(text) => text,
        Err(e) => return assistant_error(&e),
    };

    // Dropping this stream when the client disconnects stops generation.
    let events = async_stream::stream! {
        let mut failed = false;
        while let Some(item) = text.next().await {
            match item {
                Ok(delta) => {
                    yield Ok::<_, Infallible>(Event::default().data(normalize_newlines(&delta)));
                }
                Err(e) => {
                    let (_, error_type) = classify(&e);
                    let payload = json!({ "message": e.to_string(), "type": error_type });
                    yield Ok(Event::default().event("error").data(payload.to_string()));
                    failed = true;
                    break;
                }
            }
        }
        if !failed {
            yield Ok(Event::default().event("done").data("[DONE]"));
        }
    };

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// SSE fields cannot carry carriage returns; `\n` is split into data lines.
fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use beleth::SafeInputGuardrail;
    use paimon_core::{ChatModel, ChatRequest, ChatResponse, ModelId};

    use super::*;

    /// Echoes the user, or answers with a fixed report when asked for one.
    struct EchoModel {
        id: ModelId,
    }

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            let text = if request.response_format.is_some() {
                r#"{"name":"Plan","suggestionList":["Practice"]}"#.to_string()
            } else {
                format!("echo: {}", request.last_user_message().unwrap_or_default())
            };
            Ok(ChatResponse::text(request.request_id, self.id.clone(), text))
        }

        fn model_id(&self) -> &ModelId {
            &self.id
        }
    }

    async fn spawn_server() -> (String, Arc<AppState>) {
        let assistant = Assistant::builder()
            .model(Arc::new(EchoModel {
                id: ModelId::new("echo"),
            }))
            .guardrail(Arc::new(SafeInputGuardrail::default()))
            .build()
            .unwrap();
        let server = Server::new(
            ServerConfig::default(),
            assistant,
            IngestStatus::Degraded {
                reason: "no documents".into(),
            },
        );
        let state = server.state().clone();
        assert!(!state.is_ready());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener, std::future::pending()));

        (format!("http://{addr}"), state)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[test]
    fn test_server_config_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 3000,
            cors: false,
        };
        assert_eq!(config.addr().unwrap(), "127.0.0.1:3000".parse().unwrap());

        let bad = ServerConfig {
            host: "not a host".into(),
            ..ServerConfig::default()
        };
        assert!(bad.addr().is_err());
    }

    #[test]
    fn test_error_classification() {
        let cases = [
            (Error::policy_violation("g", "r"), StatusCode::BAD_REQUEST),
            (
                Error::OutputParsing {
                    target: "Report".into(),
                    message: "m".into(),
                    raw: "r".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (Error::backend("openai", "down"), StatusCode::BAD_GATEWAY),
            (
                Error::RateLimited {
                    retry_after: Duration::from_secs(1),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                Error::Timeout {
                    duration: Duration::from_secs(1),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (Error::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(classify(&error).0, status, "{error}");
        }
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let (base, state) = spawn_server().await;
        let client = client();

        let health = client.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.status(), reqwest::StatusCode::OK);
        assert!(state.is_ready());

        let ready = client.get(format!("{base}/ready")).send().await.unwrap();
        assert_eq!(ready.status(), reqwest::StatusCode::OK);

        let status: Value = client
            .get(format!("{base}/api/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["knowledge"]["state"], "degraded");
    }

    #[tokio::test]
    async fn test_chat_endpoint() {
        let (base, state) = spawn_server().await;

        let reply: Value = client()
            .post(format!("{base}/api/ai/chat"))
            .json(&json!({ "memory_id": 1, "message": "hello" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["memory_id"], "1");
        assert_eq!(reply["reply"], "echo: hello");

        let history = state.assistant.memory().get(&ConversationId::from(1)).await;
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_chat_rejections() {
        let (base, _) = spawn_server().await;
        let client = client();

        let rejected = client
            .post(format!("{base}/api/ai/chat"))
            .json(&json!({ "memory_id": "a", "message": "kill the game" }))
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = rejected.json().await.unwrap();
        assert_eq!(body["error"]["type"], "policy_violation");

        let empty = client
            .post(format!("{base}/api/ai/chat"))
            .json(&json!({ "message": "   " }))
            .send()
            .await
            .unwrap();
        assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_report_endpoint() {
        let (base, _) = spawn_server().await;

        let report: Value = client()
            .post(format!("{base}/api/ai/report"))
            .json(&json!({ "message": "make me a plan" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["name"], "Plan");
        assert_eq!(report["suggestionList"][0], "Practice");
    }

    #[tokio::test]
    async fn test_stream_endpoint() {
        let (base, _) = spawn_server().await;

        let response = client()
            .get(format!("{base}/api/ai/chat/stream"))
            .query(&[("memory_id", "7"), ("message", "hi")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let body = response.text().await.unwrap();
        assert!(body.contains("data: echo: hi"));
        assert!(body.contains("event: done"));
    }

    #[tokio::test]
    async fn test_stream_endpoint_carriage_returns() {
        let (base, _) = spawn_server().await;

        let response = client()
            .get(format!("{base}/api/ai/chat/stream"))
            .query(&[("message", "line one\r\nline two\rline three")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let body = response.text().await.unwrap();
        assert!(body.contains("data: echo: line one\ndata: line two\ndata: line three"));
        assert!(body.contains("event: done"));
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\r\nb\rc\nd"), "a\nb\nc\nd");
        assert!(matches!(normalize_newlines("plain"), Cow::Borrowed("plain")));
    }
}
