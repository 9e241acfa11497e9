//! Turns the outcome of a submission into the one string the user gets to see.
//!
//! Every fault ends here: failures become `"Error: <message>"`, responses without a
//! leading text segment become [`INVALID_RESPONSE_FORMAT`]. Nothing is re-raised.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::agent::AgentResponse;
use crate::error::Result;
use crate::message::ContentSegment;

pub const INVALID_RESPONSE_FORMAT: &str = "Error: Invalid response format";

/// Why a response had no displayable text. All kinds share one user-facing
/// placeholder; the kind is kept for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFault {
    #[error("response carried no message")]
    MissingMessage,
    #[error("message content was empty")]
    EmptyContent,
    #[error("first content segment is `{kind}`, not text")]
    NonTextSegment { kind: &'static str },
}

/// What the UI shell renders for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum DisplayResult {
    Answer(String),
    Failed(String),
}

impl DisplayResult {
    pub fn as_str(&self) -> &str {
        match self {
            DisplayResult::Answer(text) | DisplayResult::Failed(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DisplayResult::Failed(_))
    }

    pub fn into_string(self) -> String {
        match self {
            DisplayResult::Answer(text) | DisplayResult::Failed(text) => text,
        }
    }
}

impl fmt::Display for DisplayResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first segment's text, verbatim.
pub fn first_text(response: &AgentResponse) -> std::result::Result<&str, ExtractionFault> {
    let message = response
        .message
        .as_ref()
        .ok_or(ExtractionFault::MissingMessage)?;
    match message.content.first() {
        None => Err(ExtractionFault::EmptyContent),
        Some(ContentSegment::Text { text }) => Ok(text.as_str()),
        Some(other) => Err(ExtractionFault::NonTextSegment { kind: other.kind() }),
    }
}

pub fn extract(response: &AgentResponse) -> DisplayResult {
    match first_text(response) {
        Ok(text) => DisplayResult::Answer(text.to_string()),
        Err(fault) => {
            tracing::warn!(
                %fault,
                stop_reason = ?response.stop_reason,
                cycles = response.cycles,
                "agent response had no displayable text"
            );
            DisplayResult::Failed(INVALID_RESPONSE_FORMAT.to_string())
        }
    }
}

/// Absorb the outcome of `submit`, logging failures before downgrading them.
pub fn render_outcome(outcome: Result<AgentResponse>) -> DisplayResult {
    match outcome {
        Ok(response) => extract(&response),
        Err(err) => {
            tracing::error!(
                error = %err,
                details = ?err,
                causes = %source_chain(&err),
                "prompt submission failed"
            );
            DisplayResult::Failed(format!("Error: {err}"))
        }
    }
}

fn source_chain(err: &dyn std::error::Error) -> String {
    let mut chain = Vec::new();
    let mut current = err.source();
    while let Some(cause) = current {
        chain.push(cause.to_string());
        current = cause.source();
    }
    if chain.is_empty() {
        "none".to_string()
    } else {
        chain.join(" <- ")
    }
}
