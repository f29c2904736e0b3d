//! Pumps domain events from the bus into the projector.
//!
//! One long-lived task per search service instance. Malformed or failing
//! events are logged and skipped rather than wedging the stream; the
//! projection converges once a well-formed event for the same question
//! arrives, and absolute field sets mean a skipped count event is repaired
//! by the next one.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::EventBus;

use super::projection::Projector;

/// Spawns the subscriber loop. The task ends when the bus closes or the
/// shutdown signal fires.
pub fn spawn(
    bus: Arc<dyn EventBus>,
    projector: Projector,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut subscription = match bus.subscribe().await {
            Ok(subscription) => subscription,
            Err(err) => {
                error!(error = %err, "event subscription failed; search index will not update");
                return;
            }
        };
        info!("search subscriber started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = subscription.next() => match next {
                    Ok(Some(event)) => {
                        if let Err(err) = projector.apply(&event) {
                            error!(topic = event.topic(), error = %err, "projection failed");
                        }
                    }
                    Ok(None) => {
                        info!("event stream closed");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "skipping undeliverable event");
                    }
                },
            }
        }
        info!("search subscriber stopped");
    })
}
