//! Question service binary.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use askstack_core::types::Tag;
use askstack_server::auth::AuthKeys;
use askstack_server::config::QuestionsConfig;
use askstack_server::network::{self, ShutdownController};
use askstack_server::questions::{self, AppState};
use askstack_server::relay::OutboxRelay;
use askstack_server::storage::QuestionStore;
use askstack_server::worker::BackgroundWorker;
use askstack_server::{bus, storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let config = QuestionsConfig::parse();

    let store = storage::connect(config.database_url.as_deref()).await?;
    seed_tags(store.as_ref(), &config.seed_tags).await?;

    let bus = bus::connect(config.broker_url.as_deref()).await?;
    let relay = OutboxRelay::new(Arc::clone(&store), bus);
    let mut relay_worker = BackgroundWorker::start(relay, config.relay_interval_ms);

    let state = AppState {
        store,
        auth: Arc::new(AuthKeys::from_secret(config.auth_secret.as_bytes())),
        relay: relay_worker.handle(),
    };

    let shutdown = Arc::new(ShutdownController::new());
    let router = network::with_default_middleware(
        questions::router(state).merge(network::health_router("questions", Arc::clone(&shutdown))),
        config.request_timeout(),
    );

    network::serve(&config.host, config.port, router, shutdown).await?;

    // Final outbox pass happens in the relay's shutdown hook.
    relay_worker.stop().await;
    Ok(())
}

/// Seeds the tag table from configuration. Existing slugs are overwritten,
/// which keeps re-runs idempotent.
async fn seed_tags(store: &dyn QuestionStore, slugs: &[String]) -> anyhow::Result<()> {
    for slug in slugs {
        store
            .put_tag(Tag {
                slug: slug.clone(),
                name: slug.clone(),
                description: None,
            })
            .await?;
    }
    if !slugs.is_empty() {
        info!(count = slugs.len(), "seeded tags");
    }
    Ok(())
}
