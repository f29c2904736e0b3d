//! In-process [`EventBus`] backed by a tokio broadcast channel.
//!
//! Fan-out matches the broker's topic-exchange behavior for a single
//! process: every subscription sees every event published after it was
//! opened. A slow consumer that overflows the channel skips the overwritten
//! events (logged), mirroring how an unbounded broker backlog would be
//! trimmed.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use askstack_core::events::DomainEvent;

use super::{BusError, EventBus, EventSubscription};

const DEFAULT_CAPACITY: usize = 1024;

pub struct MemoryBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl MemoryBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, event: &DomainEvent) -> Result<(), BusError> {
        // No subscribers is not an error: the broker accepts publishes to
        // topics nobody is consuming yet.
        let _ = self.tx.send(event.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn EventSubscription>, BusError> {
        Ok(Box::new(MemorySubscription {
            rx: self.tx.subscribe(),
        }))
    }
}

struct MemorySubscription {
    rx: broadcast::Receiver<DomainEvent>,
}

#[async_trait]
impl EventSubscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<DomainEvent>, BusError> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "memory bus subscription lagged");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use askstack_core::events::{QuestionDeleted, topics};
    use uuid::Uuid;

    use super::*;

    fn deleted() -> DomainEvent {
        DomainEvent::QuestionDeleted(QuestionDeleted { id: Uuid::new_v4() })
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = MemoryBus::default();
        let mut sub = bus.subscribe().await.unwrap();

        let event = deleted();
        bus.publish(&event).await.unwrap();

        let received = sub.next().await.unwrap().unwrap();
        assert_eq!(received, event);
        assert_eq!(received.topic(), topics::QUESTION_DELETED);
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = MemoryBus::default();
        let mut first = bus.subscribe().await.unwrap();
        let mut second = bus.subscribe().await.unwrap();

        let event = deleted();
        bus.publish(&event).await.unwrap();

        assert_eq!(first.next().await.unwrap().unwrap(), event);
        assert_eq!(second.next().await.unwrap().unwrap(), event);
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = MemoryBus::default();
        bus.publish(&deleted()).await.unwrap();
    }

    #[tokio::test]
    async fn subscription_ends_when_bus_drops() {
        let bus = MemoryBus::default();
        let mut sub = bus.subscribe().await.unwrap();
        drop(bus);

        assert!(sub.next().await.unwrap().is_none());
    }
}
