//! Redis-backed [`EventBus`] (feature `redis-bus`).
//!
//! Publishes each event as JSON on its topic channel and subscribes with a
//! pattern covering the whole question-service namespace. The broker remains
//! an external pre-built dependency; this is only the client seam.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use askstack_core::events::{topics, DomainEvent};

use super::{BusError, EventBus, EventSubscription};

pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisBus {
    /// Connects to the broker at `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Fails when the URL is malformed or the broker is unreachable.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(unavailable)?;
        Ok(Self { client, conn })
    }
}

fn unavailable(err: redis::RedisError) -> BusError {
    BusError::Unavailable(anyhow::Error::from(err))
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, event: &DomainEvent) -> Result<(), BusError> {
        let payload =
            serde_json::to_vec(event).map_err(|e| BusError::Malformed(anyhow::Error::from(e)))?;
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn
            .publish(event.topic(), payload)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn EventSubscription>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(unavailable)?;
        pubsub.psubscribe(topics::ALL).await.map_err(unavailable)?;
        Ok(Box::new(RedisSubscription { pubsub }))
    }
}

struct RedisSubscription {
    pubsub: redis::aio::PubSub,
}

#[async_trait]
impl EventSubscription for RedisSubscription {
    async fn next(&mut self) -> Result<Option<DomainEvent>, BusError> {
        let message = {
            let mut stream = self.pubsub.on_message();
            stream.next().await
        };
        let Some(message) = message else {
            return Ok(None);
        };
        let payload: Vec<u8> = message
            .get_payload()
            .map_err(|e| BusError::Malformed(anyhow::Error::from(e)))?;
        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|e| BusError::Malformed(anyhow::Error::from(e)))
    }
}
