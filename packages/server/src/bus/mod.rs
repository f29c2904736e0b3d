//! Event bus: the seam between the question service and downstream
//! consumers.
//!
//! The broker itself is an external pre-built dependency; this module only
//! defines the narrow client contract ([`EventBus`]) plus two
//! implementations: the in-process [`MemoryBus`] (default, used by tests and
//! single-process runs) and a Redis-backed bus behind the `redis-bus`
//! feature. Delivery is at-least-once from the consumer's point of view,
//! since the outbox relay re-publishes on failure, and nothing guarantees
//! cross-topic ordering, which is why the projection is written to converge
//! regardless of arrival order.

use async_trait::async_trait;
use thiserror::Error;

use askstack_core::events::DomainEvent;

pub mod memory;
#[cfg(feature = "redis-bus")]
pub mod redis;

pub use memory::MemoryBus;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("broker unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
    #[error("malformed event payload: {0}")]
    Malformed(#[source] anyhow::Error),
}

/// Publishing half plus subscription factory.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes one event on its topic.
    async fn publish(&self, event: &DomainEvent) -> Result<(), BusError>;

    /// Opens a subscription covering every question-service topic.
    async fn subscribe(&self) -> Result<Box<dyn EventSubscription>, BusError>;
}

/// A consumer's view of the event stream.
#[async_trait]
pub trait EventSubscription: Send {
    /// The next event, or `None` once the bus is closed.
    async fn next(&mut self) -> Result<Option<DomainEvent>, BusError>;
}

/// Connects to the configured broker, or falls back to the in-process bus
/// when no broker URL is set.
///
/// # Errors
///
/// Fails if a broker URL is set but unreachable, or set in a build without
/// the `redis-bus` feature.
pub async fn connect(broker_url: Option<&str>) -> anyhow::Result<std::sync::Arc<dyn EventBus>> {
    match broker_url {
        #[cfg(feature = "redis-bus")]
        Some(url) => {
            let bus = self::redis::RedisBus::connect(url).await?;
            Ok(std::sync::Arc::new(bus))
        }
        #[cfg(not(feature = "redis-bus"))]
        Some(_) => {
            anyhow::bail!("broker URL configured, but this build lacks the redis-bus feature")
        }
        None => Ok(std::sync::Arc::new(MemoryBus::default())),
    }
}
