//! The assistant: guardrails, retrieval, memory, tools and the chat model
//! composed into one request pipeline.

use std::sync::Arc;

use futures::StreamExt;
use paimon_core::{
    ChatModel, ChatRequest, ConversationId, Error, Message, ResponseFormat, Result,
    StreamAccumulator, TextStream, ToolDefinition,
};
use stolas::{augment_with, build_context, ContentRetriever};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::guardrail::{GuardrailResult, InputGuardrail};
use crate::memory::{ChatMemoryStore, MemorySession};
use crate::report::Report;
use crate::tool::{Tool, ToolContext, ToolProvider, ToolRegistry};

/// Default limit on tool-executing rounds per request.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 10;

/// Prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a programming learning assistant. \
Help the user learn to code, plan their study roadmap, review project ideas, \
prepare for job searches and practice interview questions. \
Answer clearly and concisely, and say so when you are unsure.";

/// Chunks buffered between the streaming producer and its consumer.
const STREAM_BUFFER: usize = 32;

/// A retrieval-augmented chat assistant.
///
/// Cloning is cheap; clones share the model, memory and tools.
#[derive(Clone)]
pub struct Assistant {
    model: Arc<dyn ChatModel>,
    system_prompt: Arc<str>,
    memory: Arc<ChatMemoryStore>,
    retriever: Option<Arc<dyn ContentRetriever>>,
    tools: ToolRegistry,
    providers: Vec<Arc<dyn ToolProvider>>,
    guardrails: Vec<Arc<dyn InputGuardrail>>,
    max_tool_rounds: u32,
}

impl Assistant {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::default()
    }

    /// Returns the conversation memory.
    #[must_use]
    pub fn memory(&self) -> &Arc<ChatMemoryStore> {
        &self.memory
    }

    /// Returns the system prompt.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Returns the statically registered tools.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answers a message within a conversation.
    ///
    /// The user message and the final reply are recorded in memory only if
    /// the whole request succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyViolation`] if a guardrail rejects the input,
    /// [`Error::ToolLoopExceeded`] if the model keeps requesting tools, or
    /// any retrieval or model error.
    pub async fn chat(
        &self,
        conversation_id: impl Into<ConversationId>,
        message: &str,
    ) -> Result<String> {
        let id = conversation_id.into();
        self.check_input(message)?;

        let mut session = self.memory.session(&id).await;
        tracing::info!(conversation = %id, history = session.len(), "Chat request");

        let user_content = self.augment(message).await?;
        let mut messages = self.initial_messages(&session, user_content);
        let tools = self.resolve_tools(&id).await;

        let reply = self.run_tool_loop(&id, &mut messages, &tools, None).await?;
        remember(&mut session, message, &reply.content);
        Ok(reply.content)
    }

    /// Produces a structured report for a message in the default conversation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputParsing`] if the reply is not a valid report,
    /// plus every error [`Assistant::chat`] can return.
    pub async fn chat_for_report(&self, message: &str) -> Result<Report> {
        let id = ConversationId::default_conversation();
        self.check_input(message)?;

        let mut session = self.memory.session(&id).await;
        tracing::info!(conversation = %id, "Report request");

        let user_content = format!(
            "{}\n\n{}",
            self.augment(message).await?,
            Report::format_instruction()
        );
        let mut messages = self.initial_messages(&session, user_content);
        let tools = self.resolve_tools(&id).await;

        let reply = self
            .run_tool_loop(&id, &mut messages, &tools, Some(Report::response_format()))
            .await?;
        let report = Report::parse(&reply.content)?;

        tracing::info!(
            name = %report.name,
            suggestions = report.suggestion_list.len(),
            "Report generated"
        );
        remember(&mut session, message, &reply.content);
        Ok(report)
    }

    /// Answers a message as a stream of text chunks.
    ///
    /// The conversation stays locked until the stream ends. Dropping the
    /// returned stream stops generation, and memory is updated only when the
    /// model signals completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyViolation`] or a retrieval error before any
    /// text is produced. Model errors arrive through the stream.
    pub async fn chat_stream(
        &self,
        conversation_id: impl Into<ConversationId>,
        message: &str,
    ) -> Result<TextStream> {
        let id = conversation_id.into();
        self.check_input(message)?;

        let session = self.memory.session(&id).await;
        tracing::info!(conversation = %id, history = session.len(), "Streaming chat request");

        let user_content = self.augment(message).await?;
        let messages = self.initial_messages(&session, user_content);
        let tools = self.resolve_tools(&id).await;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let assistant = self.clone();
        let message = message.to_string();

        tokio::spawn(async move {
            let mut session = session;
            tokio::select! {
                () = tx.closed() => {
                    tracing::debug!(conversation = %id, "Stream consumer dropped, stopping generation");
                }
                result = assistant.stream_turn(&id, messages, &tools, &tx) => match result {
                    Ok(Some(reply)) => remember(&mut session, &message, &reply),
                    Ok(None) => {
                        tracing::debug!(conversation = %id, "Stream consumer dropped, stopping generation");
                    }
                    Err(e) => {
                        tracing::warn!(conversation = %id, error = %e, "Streaming chat failed");
                        // The consumer may already be gone.
                        let _ = tx.send(Err(e)).await;
                    }
                },
            }
        });

        Ok(TextStream::new(ReceiverStream::new(rx)))
    }

    fn check_input(&self, message: &str) -> Result<()> {
        for guardrail in &self.guardrails {
            if let GuardrailResult::Reject { reason } = guardrail.validate(message) {
                tracing::warn!(guardrail = guardrail.name(), reason = %reason, "Input rejected");
                return Err(Error::policy_violation(guardrail.name(), reason));
            }
        }
        Ok(())
    }

    async fn augment(&self, message: &str) -> Result<String> {
        let Some(retriever) = &self.retriever else {
            return Ok(message.to_string());
        };
        let results = retriever.retrieve(message).await?;
        Ok(augment_with(message, &build_context(&results)))
    }

    fn initial_messages(&self, session: &MemorySession, user_content: String) -> Vec<Message> {
        let mut messages = Vec::with_capacity(session.len() + 2);
        messages.push(Message::system(&*self.system_prompt));
        messages.extend(session.messages());
        messages.push(Message::user(user_content));
        messages
    }

    /// Static tools plus whatever the providers offer for this request.
    async fn resolve_tools(&self, id: &ConversationId) -> ToolRegistry {
        if self.providers.is_empty() {
            return self.tools.clone();
        }

        let mut tools = self.tools.clone();
        let ctx = ToolContext::new(id.clone());
        for provider in &self.providers {
            match provider.provide(&ctx).await {
                Ok(provided) => provided.into_iter().for_each(|tool| tools.register(tool)),
                Err(e) => tracing::warn!(error = %e, "Tool provider unavailable, skipping"),
            }
        }
        tools
    }

    fn request(
        messages: &[Message],
        definitions: &[ToolDefinition],
        format: Option<&ResponseFormat>,
    ) -> ChatRequest {
        let mut request = ChatRequest::new(messages.to_vec());
        if !definitions.is_empty() {
            request = request.with_tools(definitions.to_vec());
        }
        if let Some(format) = format {
            request = request.with_response_format(format.clone());
        }
        request
    }

    async fn run_tool_loop(
        &self,
        id: &ConversationId,
        messages: &mut Vec<Message>,
        tools: &ToolRegistry,
        format: Option<ResponseFormat>,
    ) -> Result<Message> {
        let definitions = tools.definitions();

        for round in 0..=self.max_tool_rounds {
            let request = Self::request(messages, &definitions, format.as_ref());
            let response = self.model.chat(request).await?;
            if !response.message.has_tool_calls() {
                tracing::debug!(rounds = round, tokens = response.usage.total_tokens, "Reply complete");
                return Ok(response.message);
            }
            if round == self.max_tool_rounds {
                break;
            }
            self.execute_tool_calls(id, messages, response.message, tools)
                .await;
        }

        Err(Error::ToolLoopExceeded {
            max_rounds: self.max_tool_rounds,
        })
    }

    /// Forwards text to `tx`. Returns `None` once the consumer is gone.
    async fn stream_turn(
        &self,
        id: &ConversationId,
        mut messages: Vec<Message>,
        tools: &ToolRegistry,
        tx: &mpsc::Sender<Result<String>>,
    ) -> Result<Option<String>> {
        let definitions = tools.definitions();

        for round in 0..=self.max_tool_rounds {
            let request = Self::request(&messages, &definitions, None);
            let mut upstream = self.model.chat_stream(request).await?;
            let mut accumulator = StreamAccumulator::new();

            while let Some(chunk) = upstream.next().await {
                let chunk = chunk?;
                accumulator.push(&chunk);
                if let Some(delta) = chunk.delta.filter(|d| !d.is_empty()) {
                    if tx.send(Ok(delta)).await.is_err() {
                        return Ok(None);
                    }
                }
            }

            if !accumulator.is_finished() {
                return Err(Error::backend(
                    self.model.model_id().to_string(),
                    "stream ended before the model finished",
                ));
            }

            let reply = accumulator.into_message();
            if !reply.has_tool_calls() {
                return Ok(Some(reply.content));
            }
            if round == self.max_tool_rounds {
                break;
            }
            self.execute_tool_calls(id, &mut messages, reply, tools).await;
        }

        Err(Error::ToolLoopExceeded {
            max_rounds: self.max_tool_rounds,
        })
    }

    /// Runs every requested call and appends the results as tool messages.
    ///
    /// Failures are reported back to the model instead of aborting the turn.
    async fn execute_tool_calls(
        &self,
        id: &ConversationId,
        messages: &mut Vec<Message>,
        reply: Message,
        tools: &ToolRegistry,
    ) {
        let calls = reply.tool_calls.clone();
        messages.push(reply);
        let ctx = ToolContext::new(id.clone()).with_messages(messages.clone());

        for call in &calls {
            let content = match tools.execute(call, &ctx).await {
                Ok(result) => result.to_content(),
                Err(e) => {
                    tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                    format!("Error: {e}")
                }
            };
            messages.push(Message::tool_result(call, content));
        }
    }
}

fn remember(session: &mut MemorySession, message: &str, reply: &str) {
    session.add(Message::user(message));
    session.add(Message::assistant(reply));
}

/// Builder for [`Assistant`].
#[derive(Default)]
pub struct AssistantBuilder {
    model: Option<Arc<dyn ChatModel>>,
    system_prompt: Option<String>,
    memory: Option<Arc<ChatMemoryStore>>,
    retriever: Option<Arc<dyn ContentRetriever>>,
    tools: ToolRegistry,
    providers: Vec<Arc<dyn ToolProvider>>,
    guardrails: Vec<Arc<dyn InputGuardrail>>,
    max_tool_rounds: Option<u32>,
}

impl AssistantBuilder {
    /// Sets the chat model.
    #[must_use]
    pub fn model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the memory store, e.g. to share it between assistants.
    #[must_use]
    pub fn memory(mut self, memory: Arc<ChatMemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Sets the content retriever.
    #[must_use]
    pub fn retriever(mut self, retriever: Arc<dyn ContentRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Registers a tool.
    #[must_use]
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    /// Replaces the tool registry.
    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Adds a tool provider consulted on every request.
    #[must_use]
    pub fn tool_provider(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Adds an input guardrail. Guardrails run in insertion order.
    #[must_use]
    pub fn guardrail(mut self, guardrail: Arc<dyn InputGuardrail>) -> Self {
        self.guardrails.push(guardrail);
        self
    }

    /// Sets the maximum number of tool rounds per request.
    #[must_use]
    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = Some(rounds);
        self
    }

    /// Builds the assistant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if no chat model was set.
    pub fn build(self) -> Result<Assistant> {
        let model = self
            .model
            .ok_or_else(|| Error::invalid_config("assistant requires a chat model"))?;
        let system_prompt = self
            .system_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Assistant {
            model,
            system_prompt: system_prompt.into(),
            memory: self.memory.unwrap_or_default(),
            retriever: self.retriever,
            tools: self.tools,
            providers: self.providers,
            guardrails: self.guardrails,
            max_tool_rounds: self.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use paimon_core::{ChatResponse, ModelId, RequestId};

    use super::*;

    struct Parrot {
        id: ModelId,
    }

    #[async_trait]
    impl ChatModel for Parrot {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            let last = request.last_user_message().unwrap_or_default().to_string();
            Ok(ChatResponse::text(request.request_id, self.id.clone(), last))
        }

        fn model_id(&self) -> &ModelId {
            &self.id
        }
    }

    fn parrot() -> Arc<dyn ChatModel> {
        Arc::new(Parrot {
            id: ModelId::new("parrot"),
        })
    }

    #[test]
    fn test_build_requires_model() {
        assert!(matches!(
            Assistant::builder().build(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_build_defaults() {
        let assistant = Assistant::builder()
            .model(parrot())
            .system_prompt("   ")
            .build()
            .unwrap();

        assert_eq!(assistant.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(assistant.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
        assert!(assistant.tools().is_empty());
    }

    #[tokio::test]
    async fn test_chat_records_turn() {
        let assistant = Assistant::builder().model(parrot()).build().unwrap();

        let reply = assistant.chat(7, "hello").await.unwrap();
        assert_eq!(reply, "hello");

        let history = assistant.memory().get(&ConversationId::from(7)).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Message::user("hello"));
        assert_eq!(history[1], Message::assistant("hello"));
    }

    #[test]
    fn test_request_omits_empty_tools() {
        let messages = vec![Message::user("hi")];
        let request = Assistant::request(&messages, &[], None);
        assert!(request.tools.is_empty());
        assert!(request.response_format.is_none());

        let format = Report::response_format();
        let request = Assistant::request(&messages, &[], Some(&format));
        assert!(request.response_format.is_some());
    }
}
