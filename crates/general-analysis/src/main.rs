mod analysis;
mod cache;
mod config;
mod error;
mod matcher;
mod merge;
mod model;
mod registry;
mod server;
mod store;
mod verdict;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tracing::info;
use tracing_subscriber::EnvFilter;

use avalia_common::backend::{BackendClient, BackendConfig};
use avalia_common::redis::RedisStore;

use analysis::AnalysisService;
use cache::StateCache;
use config::Config;
use registry::CriterionRegistry;
use server::GeneralAnalysisServer;
use store::ResultStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr (stdout is reserved for MCP JSON-RPC)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting general-analysis MCP server");

    // 1. Load config from environment
    let config = Config::from_env()?;
    info!(
        redis = config.redis_url.is_some(),
        temperature = config.default_temperature,
        max_tokens = config.default_max_tokens,
        "configuration loaded"
    );

    // 2. Connect to Redis (optional — graceful degradation if unavailable)
    let cache = Arc::new(StateCache::new(RedisStore::new(config.redis_url.as_deref())));
    if cache.is_available().await {
        info!("redis connected");
    } else {
        info!("redis unavailable, running memory-only");
    }

    // 3. Restore persisted session state, if any
    let registry = match cache.get_registry().await {
        Some(snapshot) => CriterionRegistry::from_snapshot(snapshot),
        None => CriterionRegistry::new(),
    };
    let store = match cache.get_results().await {
        Some(results) => ResultStore::from_results(results),
        None => ResultStore::new(),
    };
    if registry.is_empty() {
        info!("starting with an empty criterion registry");
    }
    info!(
        criteria = registry.len(),
        results = store.len(),
        "session state ready"
    );

    // 4. Build the backend client
    let client = Arc::new(BackendClient::new(BackendConfig::from_env())?);
    info!(
        base_url = %client.config().base_url,
        timeout_ms = client.config().default_timeout.as_millis(),
        max_retries = client.config().max_retries,
        "backend client configured"
    );

    let analysis = Arc::new(AnalysisService::new(
        Arc::clone(&client),
        config.default_temperature,
        config.default_max_tokens,
        config.default_analysis_name.clone(),
    ));

    // 5. Build the MCP server and serve on stdio
    let server = GeneralAnalysisServer::new(registry, store, analysis, client, cache);

    info!("MCP server ready, serving on stdio");
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!(error = %e, "MCP server error");
    })?;

    service.waiting().await?;
    info!("MCP server shut down");
    Ok(())
}
