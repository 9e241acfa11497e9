//! A small prompt desk in front of a tool-calling agent.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an Ollama client and a scripted stub.
//! - A tool interface (`Tool` and `ToolRegistry`) plus the default clock and calculator tools.
//! - An `Agent` that loops between the model and its tools, behind the `AgentClient` seam.
//! - `extract`/`render_outcome`, which reduce any submission outcome to one display string.
//! - `PromptPipeline`, the `submit_and_extract` entry point, and an axum page (`server` feature).

mod agent;
mod config;
mod error;
mod extract;
mod llm;
mod message;
mod pipeline;
mod telemetry;
mod tool;
pub mod tools;

#[cfg(feature = "server")]
pub mod server;

pub use agent::{Agent, AgentClient, AgentResponse, StopReason};
pub use config::{
    AgentConfig, AgentSettings, AppConfig, LoggingConfig, ModelConfig, ServerConfig, UiConfig,
    DEFAULT_MODEL_ID, DEFAULT_OLLAMA_HOST, DEFAULT_PROMPT, DEFAULT_TEMPERATURE,
};
pub use error::{DeskError, Result};
pub use extract::{
    extract, first_text, render_outcome, DisplayResult, ExtractionFault, INVALID_RESPONSE_FORMAT,
};
pub use llm::{LanguageModel, ModelCompletion, OllamaClient, StubModel, Usage};
pub use message::{ContentSegment, Message, Role, ToolCall, ToolResult};
pub use pipeline::PromptPipeline;
pub use telemetry::{
    init_tracing, FailureRecord, TelemetryCollector, TelemetryEvent, TelemetrySnapshot,
    DEFAULT_TELEMETRY_CAPACITY,
};
pub use tool::{Tool, ToolDescription, ToolRegistry};
pub use tools::default_toolset;
