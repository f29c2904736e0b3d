//! Domain event payloads published by the question service.
//!
//! Each event is an immutable fact describing a completed state change and
//! carries a copy of exactly the fields the search projection needs. Events
//! have no version or sequence number on the wire; ordering and delivery
//! guarantees come from the outbox relay, and the projection is written to
//! converge under duplicate or reordered delivery.
//!
//! Wire format: JSON with camelCase fields, adjacently tagged as
//! `{ "type": ..., "payload": ... }`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker topic names, one per event kind.
pub mod topics {
    pub const QUESTION_CREATED: &str = "askstack.questions.created";
    pub const QUESTION_UPDATED: &str = "askstack.questions.updated";
    pub const QUESTION_DELETED: &str = "askstack.questions.deleted";
    pub const ANSWER_COUNT_UPDATED: &str = "askstack.questions.answer-count";
    pub const ANSWER_ACCEPTED: &str = "askstack.questions.answer-accepted";

    /// Pattern matching every question-service topic, for subscribers that
    /// consume the whole stream.
    pub const ALL: &str = "askstack.questions.*";
}

/// A new question was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCreated {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub tags: Vec<String>,
}

/// A question's title, content, or tags changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionUpdated {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// A question and all of its answers were removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDeleted {
    pub id: Uuid,
}

/// A question's answer count changed.
///
/// Carries the absolute count, not a delta, so replays are harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCountUpdated {
    pub question_id: Uuid,
    pub count: u32,
}

/// One of the question's answers was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerAccepted {
    pub question_id: Uuid,
}

/// The closed set of events the question service publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum DomainEvent {
    QuestionCreated(QuestionCreated),
    QuestionUpdated(QuestionUpdated),
    QuestionDeleted(QuestionDeleted),
    AnswerCountUpdated(AnswerCountUpdated),
    AnswerAccepted(AnswerAccepted),
}

impl DomainEvent {
    /// The broker topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::QuestionCreated(_) => topics::QUESTION_CREATED,
            Self::QuestionUpdated(_) => topics::QUESTION_UPDATED,
            Self::QuestionDeleted(_) => topics::QUESTION_DELETED,
            Self::AnswerCountUpdated(_) => topics::ANSWER_COUNT_UPDATED,
            Self::AnswerAccepted(_) => topics::ANSWER_ACCEPTED,
        }
    }

    /// The question this event concerns. Every event kind carries one.
    #[must_use]
    pub fn question_id(&self) -> Uuid {
        match self {
            Self::QuestionCreated(e) => e.id,
            Self::QuestionUpdated(e) => e.id,
            Self::QuestionDeleted(e) => e.id,
            Self::AnswerCountUpdated(e) => e.question_id,
            Self::AnswerAccepted(e) => e.question_id,
        }
    }
}
