//! Search service binary.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use askstack_server::bus;
use askstack_server::config::SearchConfig;
use askstack_server::network::{self, ShutdownController};
use askstack_server::search::{self, Projector, SearchIndex, SearchState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let config = SearchConfig::parse();

    let index = Arc::new(match &config.index_dir {
        Some(dir) => SearchIndex::open_in_dir(dir)?,
        None => SearchIndex::open_in_ram()?,
    });

    let bus = bus::connect(config.broker_url.as_deref()).await?;
    let shutdown = Arc::new(ShutdownController::new());
    let subscriber = search::subscriber::spawn(
        bus,
        Projector::new(Arc::clone(&index)),
        shutdown.shutdown_receiver(),
    );

    let router = network::with_default_middleware(
        search::router(SearchState { index })
            .merge(network::health_router("search", Arc::clone(&shutdown))),
        config.request_timeout(),
    );

    network::serve(&config.host, config.port, router, shutdown).await?;

    subscriber.await?;
    Ok(())
}
