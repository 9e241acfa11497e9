use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{DeskError, Result};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL_ID: &str = "ibm/granite4:small-h";
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

pub const DEFAULT_PROMPT: &str = "Evaluate ((313*(451+293))/(4^2))+(sqrt(734)).
Subtract the results, rounded to the nearest integer, from the product of the current year and month.
Summarize your mathematical expressions work using LaTeX. Wrap each block of LaTeX in double dollar signs ('$$').";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|err| {
                DeskError::Config(format!(
                    "invalid listen address {}:{}: {err}",
                    self.host, self.port
                ))
            })
    }
}

fn default_server_host() -> String {
    "127.0.0.1".into()
}

fn default_server_port() -> u16 {
    7860
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model_host")]
    pub host: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ask reasoning-capable models to return their thinking separately.
    #[serde(default)]
    pub think: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            host: default_model_host(),
            model_id: default_model_id(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            think: false,
        }
    }
}

impl ModelConfig {
    /// Validate and freeze the backend settings.
    pub fn agent_config(&self) -> Result<AgentConfig> {
        AgentConfig::new(&self.host, &self.model_id, self.temperature)
            .map(|cfg| cfg.with_timeout(Duration::from_secs(self.timeout_secs.max(1))))
            .map(|cfg| cfg.with_think(self.think))
    }
}

fn default_model_host() -> String {
    DEFAULT_OLLAMA_HOST.into()
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.into()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSettings {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_prompt")]
    pub default_prompt: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            default_prompt: default_prompt(),
            placeholder: default_placeholder(),
        }
    }
}

fn default_title() -> String {
    "Sayr Desk | Ollama | Granite 4.0".into()
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.into()
}

fn default_placeholder() -> String {
    "Response will appear here...".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "sayr_desk=info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| DeskError::Config(format!("Failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Defaults with environment overrides, for running without a config file.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(host) = env::var("DESK_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("DESK_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                self.server.port = parsed;
            }
        }
        if let Ok(host) = env::var("OLLAMA_HOST") {
            self.model.host = host;
        }
        if let Ok(model) = env::var("OLLAMA_MODEL") {
            self.model.model_id = model;
        }
        if let Ok(temperature) = env::var("DESK_TEMPERATURE") {
            if let Ok(parsed) = temperature.parse::<f64>() {
                self.model.temperature = parsed;
            }
        }
        if let Ok(timeout) = env::var("DESK_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.model.timeout_secs = parsed;
            }
        }
        if let Ok(steps) = env::var("DESK_MAX_STEPS") {
            if let Ok(parsed) = steps.parse::<usize>() {
                self.agent.max_steps = parsed;
            }
        }
        if let Ok(prompt) = env::var("DESK_SYSTEM_PROMPT") {
            self.agent.system_prompt = Some(prompt);
        }
        if let Ok(filter) = env::var("DESK_LOG_FILTER") {
            self.logging.filter = filter;
        }
        if let Ok(json) = env::var("DESK_LOG_JSON") {
            if let Ok(parsed) = json.parse::<bool>() {
                self.logging.json = parsed;
            }
        }
    }
}

/// Validated connection settings for the model backend. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    host: Url,
    model_id: String,
    temperature: f64,
    timeout: Duration,
    think: bool,
}

impl AgentConfig {
    /// `host` may omit the scheme and port the way `OLLAMA_HOST` usually does:
    /// `127.0.0.1:11434`, `0.0.0.0` and `gpu-box` all become `http://…:11434`.
    pub fn new(host: &str, model_id: &str, temperature: f64) -> Result<Self> {
        let host = normalize_ollama_host(host);
        let host = Url::parse(&host)
            .map_err(|err| DeskError::Config(format!("invalid model host `{host}`: {err}")))?;
        if !matches!(host.scheme(), "http" | "https") {
            return Err(DeskError::Config(format!(
                "model host must use http or https, got `{}`",
                host.scheme()
            )));
        }
        if model_id.trim().is_empty() {
            return Err(DeskError::Config("model identifier must not be empty".into()));
        }
        if !temperature.is_finite() || !(0.0..=1.0).contains(&temperature) {
            return Err(DeskError::Config(format!(
                "temperature must be between 0.0 and 1.0, got {temperature}"
            )));
        }
        Ok(Self {
            host,
            model_id: model_id.to_string(),
            temperature,
            timeout: Duration::from_secs(default_timeout_secs()),
            think: false,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_think(mut self, think: bool) -> Self {
        self.think = think;
        self
    }

    /// Base URL without a trailing slash.
    pub fn host(&self) -> &str {
        self.host.as_str().trim_end_matches('/')
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn think(&self) -> bool {
        self.think
    }
}

fn normalize_ollama_host(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        return trimmed.to_string();
    }
    let (authority, path) = match trimmed.split_once('/') {
        Some((authority, path)) => (authority, format!("/{path}")),
        None => (trimmed, String::new()),
    };
    let authority = if authority.is_empty() {
        "127.0.0.1"
    } else {
        authority
    };
    // A bracketed IPv6 literal carries its own colons; only a colon after `]` is a port.
    let has_port = match authority.rfind(']') {
        Some(end) => authority[end..].contains(':'),
        None => authority.contains(':'),
    };
    if has_port {
        format!("http://{authority}{path}")
    } else {
        format!("http://{authority}:{DEFAULT_OLLAMA_PORT}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn loads_and_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nhost='0.0.0.0'\nport=9000\n[model]\nmodel_id='llama3.1'\ntemperature=0.5"
        )
        .unwrap();

        env::set_var("DESK_PORT", "9100");
        env::set_var("OLLAMA_HOST", "http://gpu-box:11434");
        let cfg = AppConfig::from_env_or_file(file.path()).unwrap();
        env::remove_var("DESK_PORT");
        env::remove_var("OLLAMA_HOST");

        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.model.host, "http://gpu-box:11434");
        assert_eq!(cfg.model.model_id, "llama3.1");
        assert_eq!(cfg.model.temperature, 0.5);
        assert_eq!(cfg.agent.max_steps, 10);
    }

    #[test]
    #[serial]
    fn ignores_unparseable_overrides() {
        env::set_var("DESK_TEMPERATURE", "warm");
        env::set_var("DESK_PORT", "not-a-port");
        let cfg = AppConfig::from_env();
        env::remove_var("DESK_TEMPERATURE");
        env::remove_var("DESK_PORT");

        assert_eq!(cfg.model.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(cfg.server.port, 7860);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = NamedTempFile::new().unwrap();
        let cfg = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.model.host, DEFAULT_OLLAMA_HOST);
        assert_eq!(cfg.model.model_id, DEFAULT_MODEL_ID);
        assert_eq!(cfg.ui.default_prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport=").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, DeskError::Config(_)));
    }

    #[test]
    fn validates_agent_config() {
        let cfg = ModelConfig::default().agent_config().unwrap();
        assert_eq!(cfg.host(), "http://localhost:11434");
        assert_eq!(cfg.model_id(), DEFAULT_MODEL_ID);
        assert_eq!(cfg.temperature(), 0.2);
        assert_eq!(cfg.timeout(), Duration::from_secs(600));

        assert!(AgentConfig::new("ftp://host", "m", 0.2).is_err());
        assert!(AgentConfig::new(DEFAULT_OLLAMA_HOST, "  ", 0.2).is_err());
        assert!(AgentConfig::new(DEFAULT_OLLAMA_HOST, "m", 1.5).is_err());
        assert!(AgentConfig::new(DEFAULT_OLLAMA_HOST, "m", f64::NAN).is_err());
        assert!(AgentConfig::new(DEFAULT_OLLAMA_HOST, "m", 0.0).is_ok());
        assert!(AgentConfig::new(DEFAULT_OLLAMA_HOST, "m", 1.0).is_ok());
    }

    #[test]
    fn accepts_ollama_style_hosts() {
        for (raw, expected) in [
            ("127.0.0.1:11434", "http://127.0.0.1:11434"),
            ("0.0.0.0", "http://0.0.0.0:11434"),
            ("localhost", "http://localhost:11434"),
            ("gpu-box:8080", "http://gpu-box:8080"),
            ("[::1]", "http://[::1]:11434"),
            ("[::1]:9000", "http://[::1]:9000"),
            ("  https://ollama.internal  ", "https://ollama.internal"),
            ("", "http://127.0.0.1:11434"),
        ] {
            let cfg = AgentConfig::new(raw, "m", 0.2).unwrap();
            assert_eq!(cfg.host(), expected, "for {raw:?}");
        }
        assert!(AgentConfig::new("gpu box", "m", 0.2).is_err());
    }

    #[test]
    fn socket_addr_conversion() {
        let addr = ServerConfig::default().socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:7860");

        let bad = ServerConfig {
            host: "not a host".into(),
            port: 1,
        };
        assert!(bad.socket_addr().is_err());
    }
}
