//! The denormalized search document and the event projection onto it.
//!
//! [`project`] is the whole of the propagation logic from the system of
//! record to the search index: a stateless, per-event field merge with
//! last-write-wins semantics. Broker delivery is at-least-once and unordered
//! with respect to event causal order, so the merge must converge under
//! duplicates and reordering: every event sets its fields absolutely (counts
//! included), and events for a not-yet-indexed question produce a stub
//! document that later events fill in.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::DomainEvent;

/// Read-optimized projection of a question, keyed by question id.
///
/// Document ID in the index equals the question id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub has_accepted_answer: bool,
    pub answer_count: u32,
}

impl SearchDocument {
    /// An empty document for a question only known by id so far.
    ///
    /// Produced when a count or accept event outruns the corresponding
    /// `questionCreated` on the broker.
    #[must_use]
    pub fn stub(id: Uuid) -> Self {
        Self {
            id,
            title: String::new(),
            content: String::new(),
            tags: Vec::new(),
            has_accepted_answer: false,
            answer_count: 0,
        }
    }
}

/// The index operation a single event maps onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Write (create or replace) the document under its id.
    Upsert(SearchDocument),
    /// Remove the document with this question id.
    Remove(Uuid),
}

/// Maps one domain event onto the index, given the currently indexed
/// document for the same question (if any).
///
/// Reapplying an event is a no-op change-wise: each arm sets the same
/// absolute values it set the first time.
#[must_use]
pub fn project(current: Option<SearchDocument>, event: &DomainEvent) -> Projection {
    let mut doc = current.unwrap_or_else(|| SearchDocument::stub(event.question_id()));

    match event {
        DomainEvent::QuestionCreated(e) => {
            doc.title.clone_from(&e.title);
            doc.content.clone_from(&e.content);
            doc.tags.clone_from(&e.tags);
        }
        DomainEvent::QuestionUpdated(e) => {
            doc.title.clone_from(&e.title);
            doc.content.clone_from(&e.content);
            doc.tags.clone_from(&e.tags);
        }
        DomainEvent::QuestionDeleted(e) => return Projection::Remove(e.id),
        DomainEvent::AnswerCountUpdated(e) => doc.answer_count = e.count,
        DomainEvent::AnswerAccepted(_) => doc.has_accepted_answer = true,
    }

    Projection::Upsert(doc)
}
