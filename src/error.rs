use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeskError>;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("model backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("model backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
