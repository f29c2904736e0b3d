//! Gateway binary.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use askstack_server::config::GatewayConfig;
use askstack_server::gateway::{self, GatewayState};
use askstack_server::network::{self, ShutdownController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let config = GatewayConfig::parse();

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;
    let state = GatewayState {
        client,
        questions_upstream: config.questions_upstream.clone(),
        search_upstream: config.search_upstream.clone(),
    };

    let shutdown = Arc::new(ShutdownController::new());
    let router = network::with_default_middleware(
        gateway::router(state).merge(network::health_router("gateway", Arc::clone(&shutdown))),
        config.request_timeout(),
    );

    network::serve(&config.host, config.port, router, shutdown).await?;
    Ok(())
}
