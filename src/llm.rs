//! Language model implementations and abstractions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AgentConfig;
use crate::error::{DeskError, Result};
use crate::message::{ContentSegment, Message, Role, ToolCall};
use crate::tool::ToolDescription;

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Result of a chat completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

impl ModelCompletion {
    /// Assistant message in segment order: reasoning, text, tool calls.
    /// Empty strings produce no segment.
    pub fn into_message(self) -> Message {
        let mut message = Message::assistant();
        if let Some(reasoning) = self.reasoning.filter(|r| !r.is_empty()) {
            message = message.with_content(ContentSegment::Reasoning { text: reasoning });
        }
        if let Some(text) = self.content.filter(|c| !c.is_empty()) {
            message = message.with_text(text);
        }
        for call in self.tool_calls {
            message = message.with_tool_call(call);
        }
        message
    }
}

/// Minimal abstraction around a chat completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> DeskError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return DeskError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    DeskError::LanguageModel(format!("{provider} request failed with {}: {body}", status))
}

fn transport_error(err: reqwest::Error, cfg: &AgentConfig) -> DeskError {
    if err.is_timeout() {
        DeskError::Timeout(cfg.timeout())
    } else if err.is_connect() || err.is_request() {
        DeskError::BackendUnreachable(format!("Ollama at {}: {err}", cfg.host()))
    } else {
        DeskError::LanguageModel(format!("Ollama request failed: {err}"))
    }
}

fn serialize_tool_output(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama Client (Local LLM)
// ─────────────────────────────────────────────────────────────────────────────

/// Ollama client speaking the native `/api/chat` endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    config: AgentConfig,
}

impl OllamaClient {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| DeskError::Config(format!("http client error: {err}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn to_ollama_messages(messages: &[Message]) -> Vec<Value> {
        let mut built = Vec::new();
        for message in messages {
            match message.role {
                Role::Tool => {
                    for segment in &message.content {
                        if let ContentSegment::ToolResult(result) = segment {
                            built.push(json!({
                                "role": "tool",
                                "tool_name": result.name,
                                "content": serialize_tool_output(&result.output),
                            }));
                        }
                    }
                }
                role => {
                    let mut wire = json!({
                        "role": role.as_str(),
                        "content": message.text(),
                    });
                    let calls: Vec<Value> = message
                        .tool_calls()
                        .map(|call| {
                            json!({
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments,
                                }
                            })
                        })
                        .collect();
                    if !calls.is_empty() {
                        wire["tool_calls"] = json!(calls);
                    }
                    built.push(wire);
                }
            }
        }
        built
    }

    fn to_ollama_tools(tools: &[ToolDescription]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t
                            .parameters
                            .clone()
                            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    }
                })
            })
            .collect()
    }

    fn parse_completion(json: &Value) -> Result<ModelCompletion> {
        let message = json
            .get("message")
            .filter(|m| m.is_object())
            .ok_or_else(|| DeskError::Protocol("Ollama response has no `message` object".into()))?;

        let content = message["content"].as_str().map(String::from);
        let reasoning = message["thinking"].as_str().map(String::from);

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let func = &call["function"];
                let name = func["name"]
                    .as_str()
                    .ok_or_else(|| DeskError::Protocol("Ollama tool call without a name".into()))?
                    .to_string();
                // Some models send arguments as a JSON-encoded string.
                let arguments = match &func["arguments"] {
                    Value::String(raw) if raw.trim().is_empty() => json!({}),
                    Value::String(raw) => serde_json::from_str(raw).map_err(|err| {
                        DeskError::Protocol(format!(
                            "Ollama tool call `{name}` has malformed arguments: {err}"
                        ))
                    })?,
                    Value::Null => json!({}),
                    other => other.clone(),
                };
                let id = call["id"]
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments,
                });
            }
        }

        Ok(ModelCompletion {
            content,
            reasoning,
            tool_calls,
            stop_reason: json["done_reason"].as_str().map(String::from),
            usage: Usage {
                input_tokens: json["prompt_eval_count"].as_u64().unwrap_or(0),
                output_tokens: json["eval_count"].as_u64().unwrap_or(0),
            },
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let mut body = json!({
            "model": self.config.model_id(),
            "messages": Self::to_ollama_messages(messages),
            "stream": false,
            "options": { "temperature": self.config.temperature() },
        });
        if !tools.is_empty() {
            body["tools"] = json!(Self::to_ollama_tools(tools));
        }
        if self.config.think() {
            body["think"] = json!(true);
        }

        tracing::debug!(
            model = self.config.model_id(),
            messages = messages.len(),
            tools = tools.len(),
            "sending chat request to Ollama"
        );

        let resp = self
            .http
            .post(format!("{}/api/chat", self.config.host()))
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(err, &self.config))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "Ollama"));
        }

        let raw = resp
            .text()
            .await
            .map_err(|err| transport_error(err, &self.config))?;
        let json: Value = serde_json::from_str(&raw)
            .map_err(|err| DeskError::Protocol(format!("Ollama parse error: {err}")))?;

        let completion = Self::parse_completion(&json)?;
        tracing::debug!(
            tool_calls = completion.tool_calls.len(),
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            "received chat completion"
        );
        Ok(completion)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stub model (scripted, for tests and offline demos)
// ─────────────────────────────────────────────────────────────────────────────

/// Replays scripted JSON directives in order:
/// - `{"action":"respond","content":"..."}`
/// - `{"action":"call_tool","name":"...","arguments":{...}}`
/// - `{"action":"fail","error":"..."}` (backend unreachable)
///
/// Anything that is not a directive is returned verbatim as text.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Conversations the stub has been asked to complete, in call order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond { content: String },
    CallTool { name: String, arguments: Value },
    Fail { error: String },
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let raw = self
            .responses
            .lock()
            .map_err(|_| DeskError::LanguageModel("stub model poisoned".into()))?
            .pop_front()
            .ok_or_else(|| {
                DeskError::LanguageModel("StubModel ran out of scripted responses".into())
            })?;

        match serde_json::from_str::<StubDirective>(&raw) {
            Ok(StubDirective::Respond { content }) => Ok(ModelCompletion {
                content: Some(content),
                stop_reason: Some("stop".into()),
                ..ModelCompletion::default()
            }),
            Ok(StubDirective::CallTool { name, arguments }) => Ok(ModelCompletion {
                tool_calls: vec![ToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name,
                    arguments,
                }],
                ..ModelCompletion::default()
            }),
            Ok(StubDirective::Fail { error }) => Err(DeskError::BackendUnreachable(error)),
            Err(_) => Ok(ModelCompletion {
                content: Some(raw),
                stop_reason: Some("stop".into()),
                ..ModelCompletion::default()
            }),
        }
    }
}
