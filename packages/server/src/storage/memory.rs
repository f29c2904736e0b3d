//! In-memory [`QuestionStore`] engine.
//!
//! Backed by a `parking_lot` map for questions and a [`DashMap`] for tags.
//! Suitable for development, testing, and single-node deployments where the
//! data fits in memory. Each mutation runs inside the questions write lock,
//! which is what makes the ownership checks, the view-counter increment, and
//! the outbox append atomic with respect to concurrent requests.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
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

struct QuestionEntry {
    question: Question,
    answers: Vec<Answer>,
}

impl QuestionEntry {
    /// Copy of the question with the derived answer count filled in.
    fn snapshot(&self) -> Question {
        let mut question = self.question.clone();
        #[allow(clippy::cast_possible_truncation)]
        {
            question.answer_count = self.answers.len() as u32;
        }
        question
    }
}

struct Outbox {
    entries: VecDeque<OutboxEntry>,
    next_seq: u64,
}

/// In-memory question store with an embedded outbox.
pub struct MemoryStore {
    questions: RwLock<HashMap<Uuid, QuestionEntry>>,
    tags: DashMap<String, Tag>,
    outbox: Mutex<Outbox>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            questions: RwLock::new(HashMap::new()),
            tags: DashMap::new(),
            outbox: Mutex::new(Outbox {
                entries: VecDeque::new(),
                next_seq: 1,
            }),
        }
    }

    /// Appends an event to the outbox. Callers hold the questions write lock,
    /// so the state change and its event are recorded atomically.
    fn record(&self, event: DomainEvent) {
        let mut outbox = self.outbox.lock();
        let seq = outbox.next_seq;
        outbox.next_seq += 1;
        outbox.entries.push_back(OutboxEntry { seq, event });
    }

    /// Submitted slugs with no tag-table entry, in submission order.
    fn unknown_tags(&self, slugs: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        slugs
            .iter()
            .filter(|slug| !self.tags.contains_key(*slug))
            .filter(|slug| seen.insert((*slug).clone()))
            .cloned()
            .collect()
    }

    fn check_tags(&self, slugs: &[String]) -> Result<(), StoreError> {
        let unknown = self.unknown_tags(slugs);
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(StoreError::UnknownTags(unknown))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn create_question(
        &self,
        new: NewQuestion,
        author_id: &str,
        author_name: &str,
    ) -> Result<Question, StoreError> {
        self.check_tags(&new.tags)?;

        let now = now_millis();
        let question = Question {
            id: Uuid::new_v4(),
            title: new.title,
            content: new.content,
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            created_at: now,
            updated_at: now,
            views: 0,
            tags: new.tags,
            has_accepted_answer: false,
            answer_count: 0,
        };

        let mut questions = self.questions.write();
        questions.insert(
            question.id,
            QuestionEntry {
                question: question.clone(),
                answers: Vec::new(),
            },
        );
        self.record(DomainEvent::QuestionCreated(QuestionCreated {
            id: question.id,
            title: question.title.clone(),
            content: question.content.clone(),
            created_at: question.created_at,
            tags: question.tags.clone(),
        }));

        Ok(question)
    }

    async fn list_questions(&self, filter: QuestionFilter) -> Result<Vec<Question>, StoreError> {
        let questions = self.questions.read();
        let mut matched: Vec<Question> = questions
            .values()
            .filter(|entry| {
                filter
                    .tag
                    .as_ref()
                    .is_none_or(|tag| entry.question.tags.contains(tag))
            })
            .map(QuestionEntry::snapshot)
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    async fn question(&self, id: Uuid) -> Result<Question, StoreError> {
        let questions = self.questions.read();
        questions
            .get(&id)
            .map(QuestionEntry::snapshot)
            .ok_or(StoreError::QuestionNotFound)
    }

    async fn view_question(&self, id: Uuid) -> Result<(Question, Vec<Answer>), StoreError> {
        let mut questions = self.questions.write();
        let entry = questions.get_mut(&id).ok_or(StoreError::QuestionNotFound)?;
        entry.question.views += 1;
        Ok((entry.snapshot(), entry.answers.clone()))
    }

    async fn update_question(
        &self,
        id: Uuid,
        update: UpdateQuestion,
        caller_id: &str,
    ) -> Result<Question, StoreError> {
        self.check_tags(&update.tags)?;

        let mut questions = self.questions.write();
        let entry = questions.get_mut(&id).ok_or(StoreError::QuestionNotFound)?;
        if entry.question.author_id != caller_id {
            return Err(StoreError::NotOwner);
        }

        entry.question.title = update.title;
        entry.question.content = update.content;
        entry.question.tags = update.tags;
        entry.question.updated_at = now_millis();

        self.record(DomainEvent::QuestionUpdated(QuestionUpdated {
            id,
            title: entry.question.title.clone(),
            content: entry.question.content.clone(),
            tags: entry.question.tags.clone(),
        }));

        Ok(entry.snapshot())
    }

    async fn delete_question(&self, id: Uuid, caller_id: &str) -> Result<(), StoreError> {
        let mut questions = self.questions.write();
        let entry = questions.get(&id).ok_or(StoreError::QuestionNotFound)?;
        if entry.question.author_id != caller_id {
            return Err(StoreError::NotOwner);
        }

        // Answers are owned by the entry, so removing it cascades.
        questions.remove(&id);
        self.record(DomainEvent::QuestionDeleted(QuestionDeleted { id }));
        Ok(())
    }

    async fn add_answer(
        &self,
        question_id: Uuid,
        new: NewAnswer,
        author_id: &str,
        author_name: &str,
    ) -> Result<Answer, StoreError> {
        let mut questions = self.questions.write();
        let entry = questions
            .get_mut(&question_id)
            .ok_or(StoreError::QuestionNotFound)?;

        let now = now_millis();
        let answer = Answer {
            id: Uuid::new_v4(),
            question_id,
            content: new.content,
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            accepted: false,
            created_at: now,
            updated_at: now,
        };
        entry.answers.push(answer.clone());

        #[allow(clippy::cast_possible_truncation)]
        let count = entry.answers.len() as u32;
        self.record(DomainEvent::AnswerCountUpdated(AnswerCountUpdated {
            question_id,
            count,
        }));

        Ok(answer)
    }

    async fn update_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
        update: UpdateAnswer,
        caller_id: &str,
    ) -> Result<Answer, StoreError> {
        let mut questions = self.questions.write();
        let entry = questions
            .get_mut(&question_id)
            .ok_or(StoreError::QuestionNotFound)?;
        let answer = entry
            .answers
            .iter_mut()
            .find(|a| a.id == answer_id)
            .ok_or(StoreError::AnswerNotFound)?;
        if answer.author_id != caller_id {
            return Err(StoreError::NotOwner);
        }

        answer.content = update.content;
        answer.updated_at = now_millis();
        Ok(answer.clone())
    }

    async fn delete_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
        caller_id: &str,
    ) -> Result<(), StoreError> {
        let mut questions = self.questions.write();
        let entry = questions
            .get_mut(&question_id)
            .ok_or(StoreError::QuestionNotFound)?;
        let answer = entry
            .answers
            .iter()
            .find(|a| a.id == answer_id)
            .ok_or(StoreError::AnswerNotFound)?;
        if answer.author_id != caller_id {
            return Err(StoreError::NotOwner);
        }
        if answer.accepted {
            return Err(StoreError::AcceptedAnswerLocked);
        }

        entry.answers.retain(|a| a.id != answer_id);

        #[allow(clippy::cast_possible_truncation)]
        let count = entry.answers.len() as u32;
        self.record(DomainEvent::AnswerCountUpdated(AnswerCountUpdated {
            question_id,
            count,
        }));

        Ok(())
    }

    async fn accept_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
        caller_id: &str,
    ) -> Result<Answer, StoreError> {
        let mut questions = self.questions.write();
        let entry = questions
            .get_mut(&question_id)
            .ok_or(StoreError::QuestionNotFound)?;
        if entry.question.author_id != caller_id {
            return Err(StoreError::NotOwner);
        }
        if entry.question.has_accepted_answer {
            return Err(StoreError::AlreadyAccepted);
        }
        let answer = entry
            .answers
            .iter_mut()
            .find(|a| a.id == answer_id)
            .ok_or(StoreError::AnswerNotFound)?;

        answer.accepted = true;
        answer.updated_at = now_millis();
        let accepted = answer.clone();
        entry.question.has_accepted_answer = true;

        self.record(DomainEvent::AnswerAccepted(AnswerAccepted { question_id }));

        Ok(accepted)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let mut tags: Vec<Tag> = self.tags.iter().map(|t| t.value().clone()).collect();
        tags.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(tags)
    }

    async fn put_tag(&self, tag: Tag) -> Result<(), StoreError> {
        if !Tag::is_valid_slug(&tag.slug) {
            return Err(StoreError::InvalidSlug(tag.slug));
        }
        self.tags.insert(tag.slug.clone(), tag);
        Ok(())
    }

    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let outbox = self.outbox.lock();
        Ok(outbox.entries.iter().take(limit).cloned().collect())
    }

    async fn ack_events(&self, up_to_seq: u64) -> Result<(), StoreError> {
        let mut outbox = self.outbox.lock();
        while outbox
            .entries
            .front()
            .is_some_and(|entry| entry.seq <= up_to_seq)
        {
            outbox.entries.pop_front();
        }
        Ok(())
    }
}
