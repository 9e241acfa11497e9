//! Prompt desk entry point.
//!
//! Loads configuration (TOML file given as the first argument, environment
//! overrides on top), builds the pipeline and serves the page until ctrl-c.

use std::path::Path;

use sayr_desk::server::DeskServer;
use sayr_desk::{init_tracing, AppConfig, PromptPipeline, Result, TelemetryCollector};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let config = match &config_path {
        Some(path) if Path::new(path).exists() => AppConfig::from_env_or_file(path)?,
        _ => AppConfig::from_env(),
    };

    init_tracing(&config.logging)?;
    match &config_path {
        Some(path) if Path::new(path).exists() => {
            tracing::info!("loaded configuration from {path}")
        }
        Some(path) => tracing::warn!("configuration file {path} not found, using defaults"),
        None => tracing::info!("no configuration file given, using defaults"),
    }

    let pipeline =
        PromptPipeline::from_config(&config)?.with_telemetry(TelemetryCollector::default());
    let addr = config.server.socket_addr()?;

    DeskServer::new(pipeline, config.ui)
        .serve(addr, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {err}");
                std::future::pending::<()>().await;
            }
            tracing::info!("received ctrl-c, shutting down");
        })
        .await
}
