use std::sync::Arc;

use serde_json::json;

use crate::agent::{Agent, AgentClient};
use crate::config::AppConfig;
use crate::error::Result;
use crate::extract::{render_outcome, DisplayResult};
use crate::llm::OllamaClient;
use crate::telemetry::TelemetryCollector;
use crate::tools::default_toolset;

/// The one entry point the UI shell calls: prompt in, display string out.
#[derive(Clone)]
pub struct PromptPipeline {
    agent: Arc<dyn AgentClient>,
    telemetry: Option<TelemetryCollector>,
}

impl PromptPipeline {
    pub fn new(agent: Arc<dyn AgentClient>) -> Self {
        Self {
            agent,
            telemetry: None,
        }
    }

    /// config → client → agent → pipeline.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let agent_config = cfg.model.agent_config()?;
        let timeout = agent_config.timeout();
        let client = OllamaClient::new(agent_config)?;
        tracing::info!(
            host = client.config().host(),
            model = client.config().model_id(),
            temperature = client.config().temperature(),
            "model client configured"
        );

        let mut agent = Agent::new(Arc::new(client))
            .with_tools(default_toolset())
            .with_max_steps(cfg.agent.max_steps)
            .with_timeout(timeout);
        if let Some(prompt) = &cfg.agent.system_prompt {
            agent = agent.with_system_prompt(prompt.clone());
        }
        tracing::info!(tools = ?agent.tools().names(), "agent ready");

        Ok(Self::new(Arc::new(agent)))
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn telemetry(&self) -> Option<&TelemetryCollector> {
        self.telemetry.as_ref()
    }

    /// Never fails: every prompt yields exactly one [`DisplayResult`].
    pub async fn submit_and_extract(&self, prompt: &str) -> DisplayResult {
        let outcome = self.agent.submit(prompt).await;
        let usage = outcome.as_ref().ok().map(|response| response.usage);
        let shown = render_outcome(outcome);

        if let Some(telemetry) = &self.telemetry {
            match &shown {
                DisplayResult::Answer(text) => telemetry.record(
                    "submission",
                    json!({
                        "outcome": "answer",
                        "chars": text.chars().count(),
                        "usage": usage,
                    }),
                ),
                DisplayResult::Failed(message) => {
                    telemetry.record("submission", json!({ "outcome": "failed" }));
                    telemetry.record_failure("submission", message.clone());
                }
            }
        }
        shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeskError;
    use crate::llm::StubModel;

    #[tokio::test]
    async fn records_outcomes_in_telemetry() {
        let model = StubModel::new(vec![
            r#"{"action":"respond","content":"4"}"#.into(),
            r#"{"action":"fail","error":"connection refused"}"#.into(),
        ]);
        let telemetry = TelemetryCollector::default();
        let pipeline =
            PromptPipeline::new(Arc::new(Agent::new(model))).with_telemetry(telemetry.clone());

        assert_eq!(
            pipeline.submit_and_extract("What is 2+2?").await,
            DisplayResult::Answer("4".into())
        );
        assert!(pipeline.submit_and_extract("again").await.is_error());

        let (events, failures) = telemetry.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].detail["outcome"], "answer");
        assert_eq!(events[1].detail["outcome"], "failed");
        assert_eq!(failures.len(), 1);
        assert!(failures[0].error.contains("connection refused"));
    }

    #[test]
    fn from_config_rejects_invalid_temperature() {
        let mut cfg = AppConfig::default();
        cfg.model.temperature = 3.0;
        let err = PromptPipeline::from_config(&cfg).err().unwrap();
        assert!(matches!(err, DeskError::Config(_)));
    }

    #[test]
    fn from_config_builds_with_defaults() {
        assert!(PromptPipeline::from_config(&AppConfig::default()).is_ok());
    }
}
