use std::sync::Arc;

use anyhow::{Error, Result};
use tracing_subscriber::EnvFilter;

use notification_service::api::{AppState, run_api_server};
use notification_service::config::Config;
use notification_service::dispatch::Orchestrator;
use notification_service::gateway::GatewayDispatcher;
use notification_service::registry::ChannelRegistry;
use notification_service::store::{PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::load()?;

    let store: Arc<dyn Store> = Arc::new(PgStore::connect(&config.database_url).await?);
    let registry = ChannelRegistry::new(store.clone());
    let gateway = GatewayDispatcher::new();
    let orchestrator =
        Orchestrator::new(store.clone(), registry.clone(), gateway.clone(), config.clone());

    let state = Arc::new(AppState {
        store,
        registry,
        orchestrator,
        gateway,
        config,
    });

    run_api_server(state)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))?;

    Ok(())
}
