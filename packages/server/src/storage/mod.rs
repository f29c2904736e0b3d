//! Question storage: the store trait, request shapes, and the outbox.
//!
//! [`QuestionStore`] is the seam between HTTP handlers and the system of
//! record. The default engine is in-memory ([`MemoryStore`]); the `postgres`
//! feature enables a sqlx-backed engine with the same contract.
//!
//! Every mutation records its domain event in the **outbox** within the same
//! critical section / transaction as the state change, so a crash can never
//! leave the store mutated without the event (or vice versa). The relay
//! drains the outbox and publishes to the broker; see [`crate::relay`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use askstack_core::events::DomainEvent;
use askstack_core::types::{Answer, Question, Tag};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;

/// Payload for `POST /questions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Payload for `PUT /questions/{id}`. Full replacement of the mutable fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestion {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Payload for `POST /questions/{id}/answers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnswer {
    pub content: String,
}

/// Payload for `PUT /questions/{id}/answers/{answer_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnswer {
    pub content: String,
}

/// Listing filter for `GET /questions`.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    /// Only questions carrying this tag slug.
    pub tag: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

/// One outbox row: a recorded domain event plus its store-assigned sequence
/// number. Sequence numbers are strictly increasing in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub seq: u64,
    pub event: DomainEvent,
}

/// Errors surfaced by [`QuestionStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("question not found")]
    QuestionNotFound,
    #[error("answer not found")]
    AnswerNotFound,
    #[error("caller does not own this resource")]
    NotOwner,
    #[error("unknown tags: {}", .0.join(", "))]
    UnknownTags(Vec<String>),
    #[error("invalid tag slug: {0}")]
    InvalidSlug(String),
    #[error("question already has an accepted answer")]
    AlreadyAccepted,
    #[error("accepted answers cannot be deleted")]
    AcceptedAnswerLocked,
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// The system of record for questions, answers, and tags.
///
/// Ownership rules are enforced here, inside the same critical section as
/// the write, so concurrent requests cannot race an ownership check against
/// a mutation: question mutations require `caller_id` to match the question
/// author, answer mutations the answer author. Accepting an answer is the
/// question owner's call.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Persists a new question and records `questionCreated`.
    ///
    /// All tag slugs must exist in the tag table; unknown slugs fail the
    /// whole write with [`StoreError::UnknownTags`].
    async fn create_question(
        &self,
        new: NewQuestion,
        author_id: &str,
        author_name: &str,
    ) -> Result<Question, StoreError>;

    /// Questions matching `filter`, newest first.
    async fn list_questions(&self, filter: QuestionFilter) -> Result<Vec<Question>, StoreError>;

    /// Fetches a question without side effects.
    async fn question(&self, id: Uuid) -> Result<Question, StoreError>;

    /// Fetches a question for display, atomically incrementing its view
    /// counter (a field-level update, never read-modify-write), and returns
    /// it together with its answers.
    async fn view_question(&self, id: Uuid) -> Result<(Question, Vec<Answer>), StoreError>;

    /// Replaces title, content, and tags; records `questionUpdated`.
    async fn update_question(
        &self,
        id: Uuid,
        update: UpdateQuestion,
        caller_id: &str,
    ) -> Result<Question, StoreError>;

    /// Deletes a question and all of its answers; records `questionDeleted`.
    async fn delete_question(&self, id: Uuid, caller_id: &str) -> Result<(), StoreError>;

    /// Adds an answer; records `answerCountUpdated` with the new count.
    async fn add_answer(
        &self,
        question_id: Uuid,
        new: NewAnswer,
        author_id: &str,
        author_name: &str,
    ) -> Result<Answer, StoreError>;

    /// Edits an answer body. No event: the index carries no answer bodies.
    async fn update_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
        update: UpdateAnswer,
        caller_id: &str,
    ) -> Result<Answer, StoreError>;

    /// Deletes a non-accepted answer; records `answerCountUpdated` with the
    /// new count. Accepted answers are rejected with
    /// [`StoreError::AcceptedAnswerLocked`].
    async fn delete_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
        caller_id: &str,
    ) -> Result<(), StoreError>;

    /// Marks an answer accepted; records `answerAccepted`. Rejected with
    /// [`StoreError::AlreadyAccepted`] if the question already has one.
    async fn accept_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
        caller_id: &str,
    ) -> Result<Answer, StoreError>;

    /// All tags, ordered by slug.
    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError>;

    /// Inserts or replaces a tag. Used by seeding; questions never create
    /// tags.
    async fn put_tag(&self, tag: Tag) -> Result<(), StoreError>;

    /// Oldest undelivered outbox entries, in sequence order.
    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Acknowledges delivery of every outbox entry with `seq <= up_to_seq`.
    async fn ack_events(&self, up_to_seq: u64) -> Result<(), StoreError>;
}

/// Connects to the configured storage backend, or falls back to the
/// in-memory engine when no database URL is set.
///
/// # Errors
///
/// Fails if a database URL is set but unreachable, or set in a build without
/// the `postgres` feature.
pub async fn connect(
    database_url: Option<&str>,
) -> anyhow::Result<std::sync::Arc<dyn QuestionStore>> {
    match database_url {
        #[cfg(feature = "postgres")]
        Some(url) => {
            let store = postgres::PostgresStore::connect(url).await?;
            Ok(std::sync::Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            anyhow::bail!("database URL configured, but this build lacks the postgres feature")
        }
        None => Ok(std::sync::Arc::new(MemoryStore::new())),
    }
}

/// Current time as epoch milliseconds.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
