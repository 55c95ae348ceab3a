mod config;
mod error;
mod handlers;
mod models;
mod services;
mod storage;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::models::SizeProfiles;
use crate::services::invoker::TokioPacer;
use crate::services::llm::OpenAiClient;
use crate::storage::JsonFileRecordStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("load configuration")?;
    config
        .validate(&SizeProfiles::builtin())
        .context("size profiles do not fit the configured model ceilings")?;

    let api = Arc::new(OpenAiClient::new(&config.completion)?);
    let store = Arc::new(JsonFileRecordStore::open(config.records_dir()).await?);
    let state = AppState::new(&config, api, Arc::new(TokioPacer), store);
    let app = handlers::router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
