//! Applies domain events to the search index.
//!
//! Stateless per event: read the currently indexed document, run the pure
//! merge from `askstack-core`, write the result back. At-least-once and
//! out-of-order delivery are handled by the merge itself (absolute field
//! sets, stub documents for early events), so there is no dedup state here.

use std::sync::Arc;

use tracing::debug;

use askstack_core::document::{project, Projection};
use askstack_core::events::DomainEvent;

use super::index::SearchIndex;

#[derive(Clone)]
pub struct Projector {
    index: Arc<SearchIndex>,
}

impl Projector {
    #[must_use]
    pub fn new(index: Arc<SearchIndex>) -> Self {
        Self { index }
    }

    /// Applies one event to the index.
    ///
    /// # Errors
    ///
    /// Fails only on index I/O errors; the caller decides whether to retry
    /// or drop the event.
    pub fn apply(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let current = self.index.fetch(event.question_id())?;
        match project(current, event) {
            Projection::Upsert(document) => {
                debug!(id = %document.id, topic = event.topic(), "projecting upsert");
                self.index.upsert(&document)
            }
            Projection::Remove(id) => {
                debug!(%id, "projecting delete");
                self.index.remove(id)
            }
        }
    }
}
