//! Domain entities: questions, answers, and tags.
//!
//! These are the shapes the question service stores and serves. Timestamps
//! are epoch milliseconds (`i64`). Author identity is carried as the opaque
//! subject identifier plus display name from the identity provider's token
//! claims; there is no local user table.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A question: the system-of-record side of a search document.
///
/// `answer_count` is derived from the owned answers and filled in by the
/// store when a question is read; it is never written directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    /// Subject identifier of the asker (token `sub` claim).
    pub author_id: String,
    /// Display name of the asker (token `name` claim).
    pub author_name: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
    pub views: u64,
    /// Tag slugs. Validated against the tag table at write time; not a
    /// foreign key.
    pub tags: Vec<String>,
    pub has_accepted_answer: bool,
    pub answer_count: u32,
}

/// An answer owned by a question. Deleted together with its question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    /// At most one answer per question may be accepted, and an accepted
    /// answer cannot be deleted.
    pub accepted: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// A tag: a unique slug plus display metadata.
///
/// Questions reference tags by slug only. Unknown slugs are rejected at
/// write time; submissions never create tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

impl Tag {
    /// Returns whether `slug` is a well-formed tag slug: non-empty,
    /// lowercase ASCII alphanumerics and hyphens only.
    #[must_use]
    pub fn is_valid_slug(slug: &str) -> bool {
        !slug.is_empty()
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }
}
