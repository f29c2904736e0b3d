//! Postgres-backed [`QuestionStore`] engine (feature `postgres`).
//!
//! Same contract as the in-memory engine, with transactions supplying the
//! atomicity: every mutation and its outbox insert commit together, and the
//! view counter uses a field-level `UPDATE ... SET views = views + 1`.
//! Ownership checks run on rows locked with `FOR UPDATE`, so they cannot
//! race the write they guard.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use askstack_core::events::{
    AnswerAccepted, AnswerCountUpdated, DomainEvent, QuestionCreated, QuestionDeleted,
    QuestionUpdated,
};
use askstack_core::types::{Answer, Question, Tag};

use super::{
    now_millis, NewAnswer, NewQuestion, OutboxEntry, QuestionFilter, QuestionStore, StoreError,
    UpdateAnswer, UpdateQuestion,
};

/// Question columns plus the derived answer count and accepted flag.
const QUESTION_COLUMNS: &str = "q.id, q.title, q.content, q.author_id, q.author_name, \
     q.created_at, q.updated_at, q.views, q.tags, \
     (SELECT COUNT(*) FROM answers a WHERE a.question_id = q.id) AS answer_count, \
     EXISTS(SELECT 1 FROM answers a WHERE a.question_id = q.id AND a.accepted) AS has_accepted";

const ANSWER_COLUMNS: &str =
    "id, question_id, content, author_id, author_name, accepted, created_at, updated_at";

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects to the database and runs pending migrations.
    ///
    /// # Errors
    ///
    /// Fails when the database is unreachable or a migration fails.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(8).connect(url).await?;
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(anyhow::Error::from(err))
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn map_question(row: &PgRow) -> Result<Question, sqlx::Error> {
    Ok(Question {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        author_name: row.try_get("author_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        views: row.try_get::<i64, _>("views")? as u64,
        tags: row.try_get("tags")?,
        has_accepted_answer: row.try_get("has_accepted")?,
        answer_count: row.try_get::<i64, _>("answer_count")? as u32,
    })
}

fn map_answer(row: &PgRow) -> Result<Answer, sqlx::Error> {
    Ok(Answer {
        id: row.try_get("id")?,
        question_id: row.try_get("question_id")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        author_name: row.try_get("author_name")?,
        accepted: row.try_get("accepted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Appends an event to the outbox inside the caller's transaction.
async fn record_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &DomainEvent,
) -> Result<(), StoreError> {
    let payload = serde_json::to_string(event).map_err(|e| StoreError::Backend(e.into()))?;
    sqlx::query("INSERT INTO outbox (payload) VALUES ($1)")
        .bind(payload)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
    Ok(())
}

/// Submitted slugs with no tag-table entry, in submission order.
async fn unknown_tags(
    tx: &mut Transaction<'_, Postgres>,
    slugs: &[String],
) -> Result<Vec<String>, StoreError> {
    if slugs.is_empty() {
        return Ok(Vec::new());
    }
    let known: Vec<String> = sqlx::query_scalar("SELECT slug FROM tags WHERE slug = ANY($1)")
        .bind(slugs)
        .fetch_all(&mut **tx)
        .await
        .map_err(backend)?;
    let known: HashSet<String> = known.into_iter().collect();

    let mut seen = HashSet::new();
    Ok(slugs
        .iter()
        .filter(|slug| !known.contains(*slug))
        .filter(|slug| seen.insert((*slug).clone()))
        .cloned()
        .collect())
}

async fn check_tags(
    tx: &mut Transaction<'_, Postgres>,
    slugs: &[String],
) -> Result<(), StoreError> {
    let unknown = unknown_tags(tx, slugs).await?;
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(StoreError::UnknownTags(unknown))
    }
}

async fn fetch_question(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Question, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(backend)?
    .ok_or(StoreError::QuestionNotFound)?;
    map_question(&row).map_err(backend)
}

/// Locks the question row and returns its author id, serializing
/// count-bearing mutations on the same question.
async fn lock_question(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<String, StoreError> {
    sqlx::query_scalar("SELECT author_id FROM questions WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?
        .ok_or(StoreError::QuestionNotFound)
}

async fn answer_count(
    tx: &mut Transaction<'_, Postgres>,
    question_id: Uuid,
) -> Result<u32, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answers WHERE question_id = $1")
        .bind(question_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(backend)?;
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    Ok(count as u32)
}

#[async_trait]
impl QuestionStore for PostgresStore {
    async fn create_question(
        &self,
        new: NewQuestion,
        author_id: &str,
        author_name: &str,
    ) -> Result<Question, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        check_tags(&mut tx, &new.tags).await?;

        let now = now_millis();
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO questions (id, title, content, author_id, author_name, created_at, updated_at, views, tags) \
             VALUES ($1, $2, $3, $4, $5, $6, $6, 0, $7)",
        )
        .bind(id)
        .bind(&new.title)
        .bind(&new.content)
        .bind(author_id)
        .bind(author_name)
        .bind(now)
        .bind(&new.tags)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        record_event(
            &mut tx,
            &DomainEvent::QuestionCreated(QuestionCreated {
                id,
                title: new.title.clone(),
                content: new.content.clone(),
                created_at: now,
                tags: new.tags.clone(),
            }),
        )
        .await?;

        let question = fetch_question(&mut tx, id).await?;
        tx.commit().await.map_err(backend)?;
        Ok(question)
    }

    async fn list_questions(&self, filter: QuestionFilter) -> Result<Vec<Question>, StoreError> {
        #[allow(clippy::cast_possible_wrap)]
        let rows = sqlx::query(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions q \
             WHERE ($1::text IS NULL OR $1 = ANY(q.tags)) \
             ORDER BY q.created_at DESC, q.id LIMIT $2 OFFSET $3"
        ))
        .bind(filter.tag)
        .bind(filter.limit as i64)
        .bind(filter.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(|row| map_question(row).map_err(backend))
            .collect()
    }

    async fn question(&self, id: Uuid) -> Result<Question, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::QuestionNotFound)?;
        map_question(&row).map_err(backend)
    }

    async fn view_question(&self, id: Uuid) -> Result<(Question, Vec<Answer>), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query("UPDATE questions SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::QuestionNotFound);
        }

        let question = fetch_question(&mut tx, id).await?;
        let rows = sqlx::query(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE question_id = $1 ORDER BY created_at, id"
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(backend)?;
        let answers = rows
            .iter()
            .map(|row| map_answer(row).map_err(backend))
            .collect::<Result<Vec<_>, _>>()?;

        tx.commit().await.map_err(backend)?;
        Ok((question, answers))
    }

    async fn update_question(
        &self,
        id: Uuid,
        update: UpdateQuestion,
        caller_id: &str,
    ) -> Result<Question, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let author_id = lock_question(&mut tx, id).await?;
        if author_id != caller_id {
            return Err(StoreError::NotOwner);
        }
        check_tags(&mut tx, &update.tags).await?;

        sqlx::query(
            "UPDATE questions SET title = $2, content = $3, tags = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.content)
        .bind(&update.tags)
        .bind(now_millis())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        record_event(
            &mut tx,
            &DomainEvent::QuestionUpdated(QuestionUpdated {
                id,
                title: update.title.clone(),
                content: update.content.clone(),
                tags: update.tags.clone(),
            }),
        )
        .await?;

        let question = fetch_question(&mut tx, id).await?;
        tx.commit().await.map_err(backend)?;
        Ok(question)
    }

    async fn delete_question(&self, id: Uuid, caller_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let author_id = lock_question(&mut tx, id).await?;
        if author_id != caller_id {
            return Err(StoreError::NotOwner);
        }

        // Answers go with the question via ON DELETE CASCADE.
        sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        record_event(&mut tx, &DomainEvent::QuestionDeleted(QuestionDeleted { id })).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn add_answer(
        &self,
        question_id: Uuid,
        new: NewAnswer,
        author_id: &str,
        author_name: &str,
    ) -> Result<Answer, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        lock_question(&mut tx, question_id).await?;

        let now = now_millis();
        let id = Uuid::new_v4();
        let row = sqlx::query(&format!(
            "INSERT INTO answers (id, question_id, content, author_id, author_name, accepted, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, FALSE, $6, $6) RETURNING {ANSWER_COLUMNS}"
        ))
        .bind(id)
        .bind(question_id)
        .bind(&new.content)
        .bind(author_id)
        .bind(author_name)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        let answer = map_answer(&row).map_err(backend)?;

        let count = answer_count(&mut tx, question_id).await?;
        record_event(
            &mut tx,
            &DomainEvent::AnswerCountUpdated(AnswerCountUpdated { question_id, count }),
        )
        .await?;

        tx.commit().await.map_err(backend)?;
        Ok(answer)
    }

    async fn update_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
        update: UpdateAnswer,
        caller_id: &str,
    ) -> Result<Answer, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let author_id: String = sqlx::query_scalar(
            "SELECT author_id FROM answers WHERE id = $1 AND question_id = $2 FOR UPDATE",
        )
        .bind(answer_id)
        .bind(question_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or(StoreError::AnswerNotFound)?;
        if author_id != caller_id {
            return Err(StoreError::NotOwner);
        }

        let row = sqlx::query(&format!(
            "UPDATE answers SET content = $3, updated_at = $4 WHERE id = $1 AND question_id = $2 \
             RETURNING {ANSWER_COLUMNS}"
        ))
        .bind(answer_id)
        .bind(question_id)
        .bind(&update.content)
        .bind(now_millis())
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        let answer = map_answer(&row).map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(answer)
    }

    async fn delete_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
        caller_id: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        lock_question(&mut tx, question_id).await?;

        let row = sqlx::query(
            "SELECT author_id, accepted FROM answers WHERE id = $1 AND question_id = $2 FOR UPDATE",
        )
        .bind(answer_id)
        .bind(question_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or(StoreError::AnswerNotFound)?;
        let author_id: String = row.try_get("author_id").map_err(backend)?;
        let accepted: bool = row.try_get("accepted").map_err(backend)?;
        if author_id != caller_id {
            return Err(StoreError::NotOwner);
        }
        if accepted {
            return Err(StoreError::AcceptedAnswerLocked);
        }

        sqlx::query("DELETE FROM answers WHERE id = $1")
            .bind(answer_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let count = answer_count(&mut tx, question_id).await?;
        record_event(
            &mut tx,
            &DomainEvent::AnswerCountUpdated(AnswerCountUpdated { question_id, count }),
        )
        .await?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn accept_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
        caller_id: &str,
    ) -> Result<Answer, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let author_id = lock_question(&mut tx, question_id).await?;
        if author_id != caller_id {
            return Err(StoreError::NotOwner);
        }

        let already: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM answers WHERE question_id = $1 AND accepted)",
        )
        .bind(question_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        if already {
            return Err(StoreError::AlreadyAccepted);
        }

        let row = sqlx::query(&format!(
            "UPDATE answers SET accepted = TRUE, updated_at = $3 WHERE id = $1 AND question_id = $2 \
             RETURNING {ANSWER_COLUMNS}"
        ))
        .bind(answer_id)
        .bind(question_id)
        .bind(now_millis())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or(StoreError::AnswerNotFound)?;
        let answer = map_answer(&row).map_err(backend)?;

        record_event(
            &mut tx,
            &DomainEvent::AnswerAccepted(AnswerAccepted { question_id }),
        )
        .await?;

        tx.commit().await.map_err(backend)?;
        Ok(answer)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let rows = sqlx::query("SELECT slug, name, description FROM tags ORDER BY slug")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter()
            .map(|row| {
                Ok(Tag {
                    slug: row.try_get("slug").map_err(backend)?,
                    name: row.try_get("name").map_err(backend)?,
                    description: row.try_get("description").map_err(backend)?,
                })
            })
            .collect()
    }

    async fn put_tag(&self, tag: Tag) -> Result<(), StoreError> {
        if !Tag::is_valid_slug(&tag.slug) {
            return Err(StoreError::InvalidSlug(tag.slug));
        }
        sqlx::query(
            "INSERT INTO tags (slug, name, description) VALUES ($1, $2, $3) \
             ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description",
        )
        .bind(&tag.slug)
        .bind(&tag.name)
        .bind(&tag.description)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        #[allow(clippy::cast_possible_wrap)]
        let rows = sqlx::query("SELECT seq, payload FROM outbox ORDER BY seq LIMIT $1")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter()
            .map(|row| {
                let seq: i64 = row.try_get("seq").map_err(backend)?;
                let payload: String = row.try_get("payload").map_err(backend)?;
                let event = serde_json::from_str(&payload)
                    .map_err(|e| StoreError::Backend(e.into()))?;
                #[allow(clippy::cast_sign_loss)]
                Ok(OutboxEntry {
                    seq: seq as u64,
                    event,
                })
            })
            .collect()
    }

    async fn ack_events(&self, up_to_seq: u64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM outbox WHERE seq <= $1")
            .bind(i64::try_from(up_to_seq).unwrap_or(i64::MAX))
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
