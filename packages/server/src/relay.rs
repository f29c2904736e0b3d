//! Outbox relay: delivers recorded domain events to the broker.
//!
//! The store appends events to its outbox inside the same transaction as the
//! state change; this relay is the other half of the pattern. It drains the
//! outbox in sequence order, publishes each event, and acknowledges only
//! what was actually published. A publish failure stops the current pass and
//! the remaining entries are retried on the next tick, so delivery is
//! at-least-once and ordered per store, and HTTP callers are never exposed
//! to broker errors.
//!
//! Runs inside a [`BackgroundWorker`](crate::worker::BackgroundWorker):
//! handlers nudge it after each mutation for low latency, and the periodic
//! tick retries anything a nudge missed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::storage::QuestionStore;
use crate::worker::BackgroundRunnable;

const DEFAULT_BATCH: usize = 64;

/// Wake-up task for the relay worker. Carries no data: the outbox itself is
/// the queue.
#[derive(Debug, Clone, Copy)]
pub struct Flush;

pub struct OutboxRelay {
    store: Arc<dyn QuestionStore>,
    bus: Arc<dyn EventBus>,
    batch_size: usize,
}

impl OutboxRelay {
    #[must_use]
    pub fn new(store: Arc<dyn QuestionStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            batch_size: DEFAULT_BATCH,
        }
    }

    /// Publishes pending outbox entries until the outbox is empty or a
    /// publish fails.
    async fn drain(&self) {
        loop {
            let batch = match self.store.pending_events(self.batch_size).await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(error = %err, "outbox read failed");
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }

            let mut delivered = None;
            for entry in &batch {
                match self.bus.publish(&entry.event).await {
                    Ok(()) => delivered = Some(entry.seq),
                    Err(err) => {
                        warn!(seq = entry.seq, error = %err, "event publish failed, will retry");
                        break;
                    }
                }
            }

            let Some(up_to) = delivered else { return };
            if let Err(err) = self.store.ack_events(up_to).await {
                // Unacked entries will be re-published: at-least-once.
                warn!(error = %err, "outbox ack failed");
                return;
            }
            debug!(up_to, "outbox drained");

            if delivered != batch.last().map(|entry| entry.seq) {
                return;
            }
        }
    }
}

#[async_trait]
impl BackgroundRunnable for OutboxRelay {
    type Task = Flush;

    async fn run(&mut self, _task: Flush) {
        self.drain().await;
    }

    async fn on_tick(&mut self) {
        self.drain().await;
    }

    async fn shutdown(&mut self) {
        // Final pass so a clean shutdown leaves no undelivered events behind.
        self.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use askstack_core::events::DomainEvent;

    use super::*;
    use crate::bus::{BusError, EventSubscription, MemoryBus};
    use crate::storage::{MemoryStore, NewQuestion, QuestionStore};

    /// Bus double that records publishes and can be switched to fail.
    #[derive(Default)]
    struct FlakyBus {
        published: Mutex<Vec<DomainEvent>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn publish(&self, event: &DomainEvent) -> Result<(), BusError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(BusError::Unavailable(anyhow::anyhow!("broker down")));
            }
            self.published.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn subscribe(&self) -> Result<Box<dyn EventSubscription>, BusError> {
            unimplemented!("not used by relay tests")
        }
    }

    async fn seeded_store(question_count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .put_tag(askstack_core::types::Tag {
                slug: "rust".to_string(),
                name: "Rust".to_string(),
                description: None,
            })
            .await
            .unwrap();
        for i in 0..question_count {
            store
                .create_question(
                    NewQuestion {
                        title: format!("q{i}"),
                        content: "c".to_string(),
                        tags: vec!["rust".to_string()],
                    },
                    "u1",
                    "Ada",
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn drain_publishes_in_order_and_acks() {
        let store = Arc::new(seeded_store(3).await);
        let bus = Arc::new(FlakyBus::default());
        let relay = OutboxRelay::new(store.clone(), bus.clone());

        relay.drain().await;

        let published = bus.published.lock().unwrap().clone();
        assert_eq!(published.len(), 3);
        assert!(published
            .iter()
            .all(|e| matches!(e, DomainEvent::QuestionCreated(_))));
        assert!(store.pending_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_keeps_entries_for_retry() {
        let store = Arc::new(seeded_store(2).await);
        let bus = Arc::new(FlakyBus::default());
        bus.failing.store(true, Ordering::SeqCst);
        let relay = OutboxRelay::new(store.clone(), bus.clone());

        relay.drain().await;
        assert_eq!(store.pending_events(10).await.unwrap().len(), 2);
        assert!(bus.published.lock().unwrap().is_empty());

        // Broker recovers; the next pass delivers everything.
        bus.failing.store(false, Ordering::SeqCst);
        relay.drain().await;
        assert_eq!(bus.published.lock().unwrap().len(), 2);
        assert!(store.pending_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn drain_crosses_batch_boundaries() {
        let store = Arc::new(seeded_store(5).await);
        let bus = Arc::new(FlakyBus::default());
        let mut relay = OutboxRelay::new(store.clone(), bus.clone());
        relay.batch_size = 2;

        relay.drain().await;

        assert_eq!(bus.published.lock().unwrap().len(), 5);
        assert!(store.pending_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivered_events_reach_a_real_subscriber() {
        let store = Arc::new(seeded_store(1).await);
        let bus = Arc::new(MemoryBus::default());
        let mut sub = bus.subscribe().await.unwrap();
        let relay = OutboxRelay::new(store.clone(), bus.clone());

        relay.drain().await;

        let event = sub.next().await.unwrap().unwrap();
        assert!(matches!(event, DomainEvent::QuestionCreated(_)));

        // Nothing left: a second drain publishes nothing.
        relay.drain().await;
        assert!(store.pending_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn question_flow_records_expected_event_sequence() {
        let store = Arc::new(seeded_store(0).await);
        let question = store
            .create_question(
                NewQuestion {
                    title: "t".to_string(),
                    content: "c".to_string(),
                    tags: vec!["rust".to_string()],
                },
                "asker",
                "Ada",
            )
            .await
            .unwrap();
        let answer = store
            .add_answer(
                question.id,
                crate::storage::NewAnswer {
                    content: "a".to_string(),
                },
                "helper",
                "Grace",
            )
            .await
            .unwrap();
        store
            .accept_answer(question.id, answer.id, "asker")
            .await
            .unwrap();

        let bus = Arc::new(FlakyBus::default());
        OutboxRelay::new(store.clone(), bus.clone()).drain().await;

        let kinds: Vec<&'static str> = bus
            .published
            .lock()
            .unwrap()
            .iter()
            .map(DomainEvent::topic)
            .collect();
        assert_eq!(
            kinds,
            vec![
                askstack_core::events::topics::QUESTION_CREATED,
                askstack_core::events::topics::ANSWER_COUNT_UPDATED,
                askstack_core::events::topics::ANSWER_ACCEPTED,
            ]
        );
    }
}
