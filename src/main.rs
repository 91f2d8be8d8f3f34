//! autotask - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the agent API.

use std::sync::Arc;

use autotask::{accounts::InMemoryAccounts, api, config::Config, store, tokenizer::TokenService};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autotask=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!(
        "Loaded configuration: base={} max_loops={}",
        config.openai_api_base, config.max_loops
    );
    if config.mock_mode {
        warn!("Mock mode enabled: agent responses are canned");
    }
    if config.dev_mode {
        warn!("Dev mode enabled: requests are not authenticated");
    }

    let tokens = TokenService::cl100k()?;
    let store = store::create_run_store(&config).await?;
    let accounts = Arc::new(InMemoryAccounts::new());

    api::serve(api::AppState::new(config, store, accounts, tokens)).await?;

    Ok(())
}
