//! Wire types for the chat completions API and the SSE framing around them.

use std::collections::BTreeMap;

use paimon_core::{
    ChatRequest, FinishReason, Message, ResponseFormat, Role, SamplingParams, StreamChunk,
    ToolCall, ToolDefinition, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    // JSON-encoded string
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl WireToolCall {
    fn from_call(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            call_type: function_type(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }

    fn into_call(self) -> ToolCall {
        ToolCall {
            id: self.id,
            name: self.function.name,
            arguments: parse_arguments(&self.function.arguments),
        }
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, arguments = %raw, "Tool arguments are not valid JSON");
        Value::String(raw.to_string())
    })
}

fn wire_message(message: &Message) -> WireMessage<'_> {
    // Assistant turns that only carry tool calls have null content.
    let content = if message.role == Role::Assistant
        && message.content.is_empty()
        && message.has_tool_calls()
    {
        None
    } else {
        Some(message.content.as_str())
    };

    WireMessage {
        role: message.role.as_str(),
        content,
        name: message.name.as_deref().filter(|_| message.role != Role::Tool),
        tool_calls: message.tool_calls.iter().map(WireToolCall::from_call).collect(),
        tool_call_id: message.tool_call_id.as_deref(),
    }
}

fn wire_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn wire_response_format(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({ "type": "text" }),
        ResponseFormat::JsonObject => json!({ "type": "json_object" }),
        ResponseFormat::JsonSchema {
            name,
            schema,
            strict,
        } => json!({
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "schema": schema,
                "strict": strict,
            }
        }),
    }
}

/// Builds the `/chat/completions` payload.
///
/// Request sampling values override `defaults` field by field.
pub(crate) fn build_chat_payload(
    request: &ChatRequest,
    model: &str,
    defaults: &SamplingParams,
    stream: bool,
) -> Value {
    let sampling = &request.sampling;
    let messages: Vec<WireMessage<'_>> = request.messages.iter().map(wire_message).collect();

    let mut payload = json!({
        "model": model,
        "messages": messages,
        "stream": stream,
    });

    if let Some(t) = sampling.temperature.or(defaults.temperature) {
        payload["temperature"] = json!(t);
    }
    if let Some(p) = sampling.top_p.or(defaults.top_p) {
        payload["top_p"] = json!(p);
    }
    if let Some(m) = sampling.max_tokens.or(defaults.max_tokens) {
        payload["max_tokens"] = json!(m);
    }
    if let Some(seed) = sampling.seed.or(defaults.seed) {
        payload["seed"] = json!(seed);
    }
    let stop = if sampling.stop_sequences.is_empty() {
        &defaults.stop_sequences
    } else {
        &sampling.stop_sequences
    };
    if !stop.is_empty() {
        payload["stop"] = json!(stop);
    }

    if !request.tools.is_empty() {
        payload["tools"] = Value::Array(request.tools.iter().map(wire_tool).collect());
    }
    if let Some(format) = &request.response_format {
        payload["response_format"] = wire_response_format(format);
    }

    payload
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChoice {
    pub message: CompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl CompletionMessage {
    pub(crate) fn into_message(self) -> Message {
        let calls = self
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_call)
            .collect();
        Message::assistant_tool_calls(self.content.unwrap_or_default(), calls)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage::new(u.prompt_tokens, u.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Splits a byte stream into SSE `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so a multi-byte character
/// split across network reads is decoded intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feeds raw bytes and returns every complete `data:` payload.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(data) = parse_data_line(&String::from_utf8_lossy(&line)) {
                events.push(data);
            }
        }
        events
    }

    /// Returns a trailing payload left without a final newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        parse_data_line(&String::from_utf8_lossy(&line))
    }
}

fn parse_data_line(line: &str) -> Option<String> {
    let line = line.trim();
    line.strip_prefix("data:")
        .map(|data| data.trim_start().to_string())
        .filter(|data| !data.is_empty())
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Turns streamed completion deltas into [`StreamChunk`]s.
///
/// Tool call fragments are accumulated per index and released together once
/// the finish reason arrives.
#[derive(Debug, Default)]
pub(crate) struct ChunkAssembler {
    pending: BTreeMap<u32, PartialToolCall>,
    finished: bool,
}

impl ChunkAssembler {
    /// Returns true once a finish reason has been emitted.
    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decodes one SSE payload. Returns `None` for payloads carrying nothing.
    pub(crate) fn feed(&mut self, data: &str) -> serde_json::Result<Option<StreamChunk>> {
        let response: StreamResponse = serde_json::from_str(data)?;
        let mut chunk = StreamChunk {
            usage: response.usage.map(Usage::from),
            ..StreamChunk::default()
        };

        if let Some(choice) = response.choices.into_iter().next() {
            chunk.delta = choice.delta.content.filter(|c| !c.is_empty());

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let entry = self.pending.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    entry.id.push_str(&id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                chunk.finish_reason = Some(FinishReason::parse(&reason).unwrap_or(FinishReason::Stop));
                chunk.tool_calls = self.drain_tool_calls();
                self.finished = true;
            }
        }

        let empty = chunk.delta.is_none()
            && chunk.tool_calls.is_empty()
            && chunk.finish_reason.is_none()
            && chunk.usage.is_none();
        Ok((!empty).then_some(chunk))
    }

    fn drain_tool_calls(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.pending)
            .into_values()
            .map(|p| ToolCall {
                id: p.id,
                name: p.name,
                arguments: parse_arguments(&p.arguments),
            })
            .collect()
    }
}
