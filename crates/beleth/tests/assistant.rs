//! End-to-end behaviour of the assistant against scripted model doubles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beleth::{
    Assistant, ChatMemoryStore, Report, SafeInputGuardrail, Tool, ToolContext, ToolProvider,
    ToolResult,
};
use futures::StreamExt;
use paimon_core::{
    ChatModel, ChatRequest, ChatResponse, ChatStream, ConversationId, Error, FinishReason,
    Message, ModelId, ResponseFormat, Result, Role, StreamChunk, ToolCall,
};
use serde_json::{json, Value};
use stolas::{HashingEmbedder, KnowledgeBase, KnowledgeBaseConfig};
use tokio::sync::oneshot;

enum Step {
    Text(&'static str),
    Tools(Vec<ToolCall>),
}

/// Replies from a fixed script and records every request it sees.
struct ScriptedModel {
    id: ModelId,
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            id: ModelId::new("scripted"),
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let request_id = request.request_id.clone();
        self.requests.lock().unwrap().push(request);

        match self.script.lock().unwrap().pop_front() {
            Some(Step::Text(text)) => Ok(ChatResponse::text(request_id, self.id.clone(), text)),
            Some(Step::Tools(calls)) => {
                Ok(ChatResponse::tool_calls(request_id, self.id.clone(), calls))
            }
            None => Err(Error::backend("scripted", "script exhausted")),
        }
    }

    fn model_id(&self) -> &ModelId {
        &self.id
    }
}

/// Signals when dropped.
struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Streams one chunk and then never finishes.
struct StallingModel {
    id: ModelId,
    dropped: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl ChatModel for StallingModel {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        Err(Error::internal("streaming only"))
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<ChatStream> {
        let signal = DropSignal(self.dropped.lock().unwrap().take());
        let stream = futures::stream::once(async { Ok::<_, Error>(StreamChunk::text("partial")) })
            .chain(futures::stream::pending())
            .map(move |chunk| {
                let _held = &signal;
                chunk
            });
        Ok(ChatStream::new(stream))
    }

    fn model_id(&self) -> &ModelId {
        &self.id
    }
}

/// Streams a fixed reply in pieces.
struct ChunkedModel {
    id: ModelId,
    pieces: Vec<&'static str>,
}

#[async_trait]
impl ChatModel for ChunkedModel {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        Err(Error::internal("streaming only"))
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<ChatStream> {
        let mut chunks: Vec<Result<StreamChunk>> = self
            .pieces
            .iter()
            .map(|p| Ok(StreamChunk::text(*p)))
            .collect();
        chunks.push(Ok(StreamChunk::finish(FinishReason::Stop)));
        Ok(ChatStream::new(futures::stream::iter(chunks)))
    }

    fn model_id(&self) -> &ModelId {
        &self.id
    }
}

struct LookupTool;

#[async_trait]
impl Tool for LookupTool {
    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Looks up a keyword"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "keyword": { "type": "string" } },
            "required": ["keyword"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let keyword = params["keyword"].as_str().unwrap_or_default();
        Ok(ToolResult::success(format!("facts about {keyword}")))
    }
}

struct StaticProvider;

#[async_trait]
impl ToolProvider for StaticProvider {
    async fn provide(&self, _ctx: &ToolContext) -> Result<Vec<Arc<dyn Tool>>> {
        let tool: Arc<dyn Tool> = Arc::new(LookupTool);
        Ok(vec![tool])
    }
}

struct BrokenProvider;

#[async_trait]
impl ToolProvider for BrokenProvider {
    async fn provide(&self, _ctx: &ToolContext) -> Result<Vec<Arc<dyn Tool>>> {
        Err(Error::backend("tool-server", "connection refused"))
    }
}

fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

fn assistant_with(model: Arc<dyn ChatModel>) -> Assistant {
    Assistant::builder()
        .model(model)
        .system_prompt("You are a test assistant.")
        .guardrail(Arc::new(SafeInputGuardrail::default()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn second_turn_sees_first_turn() {
    let model = ScriptedModel::new(vec![
        Step::Text("Nice to meet you, Ada."),
        Step::Text("Your name is Ada."),
    ]);
    let assistant = assistant_with(model.clone());

    assistant.chat(1, "My name is Ada").await.unwrap();
    let reply = assistant.chat(1, "What is my name?").await.unwrap();
    assert_eq!(reply, "Your name is Ada.");

    let requests = model.requests();
    assert_eq!(
        requests[1].messages,
        vec![
            Message::system("You are a test assistant."),
            Message::user("My name is Ada"),
            Message::assistant("Nice to meet you, Ada."),
            Message::user("What is my name?"),
        ]
    );

    // Another conversation starts empty.
    let other = ScriptedModel::new(vec![Step::Text("Hi")]);
    let fresh = Assistant::builder()
        .model(other.clone())
        .memory(assistant.memory().clone())
        .build()
        .unwrap();
    fresh.chat(2, "Hello").await.unwrap();
    assert_eq!(other.requests()[0].messages.len(), 2);
    assert_eq!(assistant.memory().get(&ConversationId::from(1)).await.len(), 4);
}

#[tokio::test]
async fn rejected_input_never_reaches_model() {
    let model = ScriptedModel::new(vec![Step::Text("unreachable")]);
    let assistant = assistant_with(model.clone());

    let err = assistant.chat(1, "kill the game").await.unwrap_err();
    match err {
        Error::PolicyViolation { guardrail, reason } => {
            assert_eq!(guardrail, "safe_input");
            assert!(reason.contains("kill"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(assistant.chat_for_report("evil plan").await.is_err());
    assert!(assistant.chat_stream(1, "kill it").await.is_err());

    assert!(model.requests().is_empty());
    assert!(assistant.memory().get(&ConversationId::from(1)).await.is_empty());
}

#[tokio::test]
async fn report_is_parsed_from_structured_reply() {
    let model = ScriptedModel::new(vec![Step::Text(
        "```json\n{\"name\":\"Ada\",\"suggestionList\":[\"Practice daily\",\"Read the book\"]}\n```",
    )]);
    let assistant = assistant_with(model.clone());

    let report = assistant
        .chat_for_report("I have studied Java for two years, give me a learning report")
        .await
        .unwrap();
    assert_eq!(report.name, "Ada");
    assert!(!report.suggestion_list.is_empty());

    let request = &model.requests()[0];
    assert!(matches!(
        request.response_format,
        Some(ResponseFormat::JsonSchema { ref name, .. }) if name == "Report"
    ));
    assert!(request.last_user_message().unwrap().contains("suggestionList"));

    // Memory keeps the user's own words, not the format instruction.
    let history = assistant.memory().get(&ConversationId::default_conversation()).await;
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0].content,
        "I have studied Java for two years, give me a learning report"
    );
}

#[tokio::test]
async fn unparseable_report_leaves_memory_unchanged() {
    let model = ScriptedModel::new(vec![Step::Text("Keep going, you are doing great!")]);
    let assistant = assistant_with(model);

    let err = assistant.chat_for_report("report please").await.unwrap_err();
    assert!(matches!(err, Error::OutputParsing { .. }));
    assert!(assistant
        .memory()
        .get(&ConversationId::default_conversation())
        .await
        .is_empty());
}

#[tokio::test]
async fn backend_failure_leaves_memory_unchanged() {
    let model = ScriptedModel::new(Vec::new());
    let assistant = assistant_with(model);

    let err = assistant.chat(5, "hello").await.unwrap_err();
    assert!(matches!(err, Error::Backend { .. }));
    assert!(assistant.memory().get(&ConversationId::from(5)).await.is_empty());
}

#[tokio::test]
async fn tool_results_are_fed_back_within_the_turn() {
    let model = ScriptedModel::new(vec![
        Step::Tools(vec![call("call_1", "lookup", json!({"keyword": "rust"}))]),
        Step::Text("Rust is a systems language."),
    ]);
    let assistant = Assistant::builder()
        .model(model.clone())
        .tool(Arc::new(LookupTool))
        .build()
        .unwrap();

    let reply = assistant.chat(1, "Tell me about rust").await.unwrap();
    assert_eq!(reply, "Rust is a systems language.");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "lookup");

    let followup = &requests[1].messages;
    let tool_message = followup.last().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(tool_message.content, "facts about rust");

    // Intermediate tool traffic is not remembered.
    let history = assistant.memory().get(&ConversationId::from(1)).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1], Message::assistant("Rust is a systems language."));
}

#[tokio::test]
async fn tool_failures_are_reported_to_the_model() {
    let model = ScriptedModel::new(vec![
        Step::Tools(vec![call("call_1", "missing", json!({}))]),
        Step::Text("Sorry, I could not look that up."),
    ]);
    let assistant = Assistant::builder()
        .model(model.clone())
        .tool_provider(Arc::new(BrokenProvider))
        .build()
        .unwrap();

    let reply = assistant.chat(1, "look something up").await.unwrap();
    assert_eq!(reply, "Sorry, I could not look that up.");

    let requests = model.requests();
    let tool_message = requests[1].messages.last().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.content.starts_with("Error:"));
}

#[tokio::test]
async fn provided_tools_are_offered() {
    let model = ScriptedModel::new(vec![Step::Text("ok")]);
    let assistant = Assistant::builder()
        .model(model.clone())
        .tool_provider(Arc::new(StaticProvider))
        .build()
        .unwrap();

    assistant.chat(1, "hi").await.unwrap();
    assert_eq!(model.requests()[0].tools[0].name, "lookup");
    assert!(assistant.tools().is_empty());
}

#[tokio::test]
async fn tool_loop_is_bounded() {
    let looping = || Step::Tools(vec![call("c", "lookup", json!({"keyword": "again"}))]);
    let model = ScriptedModel::new(vec![looping(), looping(), looping(), looping()]);
    let assistant = Assistant::builder()
        .model(model.clone())
        .tool(Arc::new(LookupTool))
        .max_tool_rounds(2)
        .build()
        .unwrap();

    let err = assistant.chat(1, "loop forever").await.unwrap_err();
    assert!(matches!(err, Error::ToolLoopExceeded { max_rounds: 2 }));
    assert_eq!(model.requests().len(), 3);
    assert!(assistant.memory().get(&ConversationId::from(1)).await.is_empty());
}

#[tokio::test]
async fn streaming_updates_memory_on_completion() {
    let model = Arc::new(ChunkedModel {
        id: ModelId::new("chunked"),
        pieces: vec!["Hel", "lo", " there"],
    });
    let assistant = assistant_with(model);

    let stream = assistant.chat_stream(3, "greet me").await.unwrap();
    assert_eq!(stream.collect_text().await.unwrap(), "Hello there");

    let history = assistant.memory().get(&ConversationId::from(3)).await;
    assert_eq!(
        history,
        vec![Message::user("greet me"), Message::assistant("Hello there")]
    );
}

#[tokio::test]
async fn dropping_the_stream_stops_generation() {
    let (dropped_tx, dropped_rx) = oneshot::channel();
    let model = Arc::new(StallingModel {
        id: ModelId::new("stalling"),
        dropped: Mutex::new(Some(dropped_tx)),
    });
    let assistant = assistant_with(model);

    let mut stream = assistant.chat_stream(4, "tell me a long story").await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
    drop(stream);

    tokio::time::timeout(Duration::from_secs(2), dropped_rx)
        .await
        .expect("upstream stream was not dropped")
        .unwrap();

    let history = tokio::time::timeout(
        Duration::from_secs(2),
        assistant.memory().get(&ConversationId::from(4)),
    )
    .await
    .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn retrieved_context_is_added_to_the_prompt() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("roadmap.md"),
        "Learning Java starts with syntax, object oriented design and the collections \
         framework, then moves on to concurrency and the JVM memory model.",
    )
    .unwrap();

    let config = KnowledgeBaseConfig {
        docs_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let kb = KnowledgeBase::bootstrap(config, Arc::new(HashingEmbedder::default()))
        .await
        .unwrap();
    assert!(kb.status().is_ready());

    let model = ScriptedModel::new(vec![Step::Text("Start with syntax.")]);
    let assistant = Assistant::builder()
        .model(model.clone())
        .memory(Arc::new(ChatMemoryStore::new(10)))
        .retriever(kb.retriever())
        .build()
        .unwrap();

    let question = "Learning Java starts with syntax, object oriented design and the collections \
                    framework, then moves on to concurrency and the JVM memory model.";
    assistant.chat(1, question).await.unwrap();

    let prompt = model.requests()[0].last_user_message().unwrap().to_string();
    assert!(prompt.starts_with(question));
    assert!(prompt.contains("Answer using the following information:"));
    assert!(prompt.contains("roadmap.md"));

    let history = assistant.memory().get(&ConversationId::from(1)).await;
    assert_eq!(history[0].content, question);
}

#[test]
fn report_schema_matches_wire_names() {
    let schema = Report::schema();
    assert_eq!(schema["required"], json!(["name", "suggestionList"]));
}

/// Answers after a delay and tracks how many calls overlap.
struct SlowModel {
    id: ModelId,
    in_flight: std::sync::atomic::AtomicUsize,
    max_in_flight: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl ChatModel for SlowModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        use std::sync::atomic::Ordering;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let text = format!("reply to {}", request.last_user_message().unwrap_or_default());
        Ok(ChatResponse::text(request.request_id, self.id.clone(), text))
    }

    fn model_id(&self) -> &ModelId {
        &self.id
    }
}

#[tokio::test]
async fn concurrent_turns_on_one_conversation_do_not_interleave() {
    let model = Arc::new(SlowModel {
        id: ModelId::new("slow"),
        in_flight: Default::default(),
        max_in_flight: Default::default(),
    });
    let assistant = Assistant::builder()
        .model(model.clone())
        .memory(Arc::new(ChatMemoryStore::new(10)))
        .build()
        .unwrap();

    let (a, b) = tokio::join!(assistant.chat(9, "first"), assistant.chat(9, "second"));
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(
        model.max_in_flight.load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    let history = assistant.memory().get(&ConversationId::from(9)).await;
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::User, Role::Assistant, Role::User, Role::Assistant]);
    for pair in history.chunks(2) {
        assert_eq!(pair[1].content, format!("reply to {}", pair[0].content));
    }
}
