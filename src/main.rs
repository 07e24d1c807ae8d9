//! TRENDFEED: GitHub trending harvester
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the HTTP source, LLM augmenter and SQLite store into the
//! orchestrator, and runs it until Ctrl+C.

use anyhow::Result;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{error, info, warn};

use trendfeed::config::AppConfig;
use trendfeed::engine::{Orchestrator, OrchestratorConfig};
use trendfeed::fetch::http::HttpSource;
use trendfeed::llm::openai::OpenAiAugmenter;
use trendfeed::storage::sqlite::SqliteStore;
use trendfeed::types::TrendError;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("TRENDFEED_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        config = %config_path,
        database = %cfg.database.path,
        model = %cfg.llm.model,
        locale = %cfg.llm.summary_language,
        "TRENDFEED starting up"
    );

    // -- Collaborators ---------------------------------------------------

    let source = HttpSource::new(Some(cfg.trending.request_timeout_secs))?;

    if cfg.llm.provider != "openai" {
        return Err(TrendError::Config(format!("Unsupported LLM provider: {}", cfg.llm.provider)).into());
    }
    let api_key = cfg.llm_api_key();
    if api_key.expose_secret().is_empty() {
        warn!(env = %cfg.llm.api_key_env, "LLM API key not set; requests will be sent without authorization");
    }
    let augmenter = OpenAiAugmenter::new(
        api_key,
        cfg.llm.api_base.clone(),
        Some(cfg.llm.model.clone()),
        Some(cfg.llm.max_tokens),
    )?;
    info!(endpoint = augmenter.endpoint(), model = augmenter.model_name(), "Using OpenAI-compatible LLM provider");

    let store = SqliteStore::connect(&cfg.database.path).await?;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(source),
        Arc::new(augmenter),
        Arc::new(store),
        OrchestratorConfig::from_app(&cfg)?,
    ));

    // -- Main loop -------------------------------------------------------

    let cancel = orchestrator.cancel_flag();
    let mut worker = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run().await }
    });

    info!("Entering main loop. Press Ctrl+C to stop.");

    tokio::select! {
        result = &mut worker => {
            if let Err(e) = result {
                error!(error = %e, "Orchestrator task ended unexpectedly");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Finishing current run.");
            cancel.cancel();
            if let Err(e) = worker.await {
                error!(error = %e, "Orchestrator task failed during shutdown");
            }
        }
    }

    info!("TRENDFEED shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trendfeed=info"));

    let json_logging = std::env::var("TRENDFEED_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
