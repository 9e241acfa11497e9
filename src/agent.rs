use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::Instrument;

use crate::error::{DeskError, Result};
use crate::llm::{LanguageModel, Usage};
use crate::message::{Message, ToolResult};
use crate::tool::ToolRegistry;

/// Why the agent stopped producing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    Other(String),
}

impl StopReason {
    fn from_backend(reason: Option<&str>) -> Self {
        match reason {
            None | Some("stop") | Some("end_turn") => StopReason::EndTurn,
            Some("length") | Some("max_tokens") => StopReason::MaxTokens,
            Some(other) => StopReason::Other(other.to_string()),
        }
    }
}

/// The final turn of one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResponse {
    pub message: Option<Message>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// Model round trips it took, tool rounds included.
    pub cycles: usize,
}

impl AgentResponse {
    pub fn from_message(message: Message) -> Self {
        Self {
            message: Some(message),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
            cycles: 1,
        }
    }
}

/// Anything that turns a prompt into an [`AgentResponse`].
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn submit(&self, prompt: &str) -> Result<AgentResponse>;
}

/// Pairs a language model with a fixed tool set and runs the tool-calling loop.
///
/// Each submission starts from a fresh conversation; nothing is retained between calls.
pub struct Agent<M: LanguageModel> {
    system_prompt: Option<String>,
    model: Arc<M>,
    tools: ToolRegistry,
    max_steps: usize,
    timeout: Duration,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            system_prompt: None,
            model,
            tools: ToolRegistry::new(),
            max_steps: 10,
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    async fn run(&self, prompt: &str) -> Result<AgentResponse> {
        let mut conversation = Vec::with_capacity(4);
        if let Some(system) = &self.system_prompt {
            conversation.push(Message::system(system.clone()));
        }
        conversation.push(Message::user(prompt));

        let tools = self.tools.describe();
        let mut usage = Usage::default();

        for step in 1..=self.max_steps {
            let completion = self.model.complete_chat(&conversation, &tools).await?;
            usage.accumulate(&completion.usage);
            let stop_reason = StopReason::from_backend(completion.stop_reason.as_deref());
            let message = completion.into_message();

            let calls: Vec<_> = message.tool_calls().cloned().collect();
            if calls.is_empty() {
                tracing::debug!(step, "agent produced final message");
                return Ok(AgentResponse {
                    message: Some(message),
                    stop_reason,
                    usage,
                    cycles: step,
                });
            }

            conversation.push(message);
            for call in calls {
                tracing::info!(tool = %call.name, arguments = %call.arguments, "calling tool");
                let output = self.tools.call(&call.name, call.arguments.clone()).await?;
                tracing::debug!(tool = %call.name, output = %output, "tool returned");
                conversation.push(Message::tool(ToolResult {
                    tool_call_id: call.id,
                    name: call.name,
                    output,
                }));
            }
        }

        Err(DeskError::Protocol(format!(
            "Agent reached the step limit ({}) without returning a response",
            self.max_steps
        )))
    }
}

#[async_trait]
impl<M: LanguageModel + 'static> AgentClient for Agent<M> {
    async fn submit(&self, prompt: &str) -> Result<AgentResponse> {
        let span = tracing::info_span!("submit", prompt_chars = prompt.chars().count());
        match tokio::time::timeout(self.timeout, self.run(prompt).instrument(span)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DeskError::Timeout(self.timeout)),
        }
    }
}
