//! Handlers for the question-service routes.

use std::sync::Arc;

use axum::extract::{FromRef, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use askstack_core::types::{Answer, Question, Tag};

use crate::auth::{AuthKeys, Identity};
use crate::error::ApiError;
use crate::relay::Flush;
use crate::storage::{
    NewAnswer, NewQuestion, QuestionFilter, QuestionStore, UpdateAnswer, UpdateQuestion,
};
use crate::worker::WorkerHandle;

const DEFAULT_PAGE: usize = 20;
const MAX_PAGE: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QuestionStore>,
    pub auth: Arc<AuthKeys>,
    pub relay: WorkerHandle<Flush>,
}

impl FromRef<AppState> for Arc<AuthKeys> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.auth)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub tag: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A question plus its answers, as served by `GET /questions/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub answers: Vec<Answer>,
}

pub async fn create_question(
    State(state): State<AppState>,
    caller: Identity,
    Json(new): Json<NewQuestion>,
) -> Result<(StatusCode, Json<Question>), ApiError> {
    let question = state
        .store
        .create_question(new, &caller.user_id, &caller.display_name)
        .await?;
    state.relay.nudge(Flush);
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn list_questions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Question>>, ApiError> {
    let filter = QuestionFilter {
        tag: params.tag,
        limit: params.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE),
        offset: params.offset.unwrap_or(0),
    };
    Ok(Json(state.store.list_questions(filter).await?))
}

pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuestionDetail>, ApiError> {
    let (question, answers) = state.store.view_question(id).await?;
    Ok(Json(QuestionDetail { question, answers }))
}

pub async fn update_question(
    State(state): State<AppState>,
    caller: Identity,
    Path(id): Path<Uuid>,
    Json(update): Json<UpdateQuestion>,
) -> Result<Json<Question>, ApiError> {
    let question = state
        .store
        .update_question(id, update, &caller.user_id)
        .await?;
    state.relay.nudge(Flush);
    Ok(Json(question))
}

pub async fn delete_question(
    State(state): State<AppState>,
    caller: Identity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_question(id, &caller.user_id).await?;
    state.relay.nudge(Flush);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_answer(
    State(state): State<AppState>,
    caller: Identity,
    Path(question_id): Path<Uuid>,
    Json(new): Json<NewAnswer>,
) -> Result<(StatusCode, Json<Answer>), ApiError> {
    let answer = state
        .store
        .add_answer(question_id, new, &caller.user_id, &caller.display_name)
        .await?;
    state.relay.nudge(Flush);
    Ok((StatusCode::CREATED, Json(answer)))
}

pub async fn update_answer(
    State(state): State<AppState>,
    caller: Identity,
    Path((question_id, answer_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<UpdateAnswer>,
) -> Result<Json<Answer>, ApiError> {
    let answer = state
        .store
        .update_answer(question_id, answer_id, update, &caller.user_id)
        .await?;
    Ok(Json(answer))
}

pub async fn delete_answer(
    State(state): State<AppState>,
    caller: Identity,
    Path((question_id, answer_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_answer(question_id, answer_id, &caller.user_id)
        .await?;
    state.relay.nudge(Flush);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn accept_answer(
    State(state): State<AppState>,
    caller: Identity,
    Path((question_id, answer_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Answer>, ApiError> {
    let answer = state
        .store
        .accept_answer(question_id, answer_id, &caller.user_id)
        .await?;
    state.relay.nudge(Flush);
    Ok(Json(answer))
}

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.store.list_tags().await?))
}

/// Routes served by the question service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/questions", post(create_question).get(list_questions))
        .route(
            "/questions/{id}",
            get(get_question)
                .put(update_question)
                .delete(delete_question),
        )
        .route("/questions/{id}/answers", post(add_answer))
        .route(
            "/questions/{id}/answers/{answer_id}",
            put(update_answer).delete(delete_answer),
        )
        .route(
            "/questions/{id}/answers/{answer_id}/accept",
            post(accept_answer),
        )
        .route("/tags", get(list_tags))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use crate::bus::MemoryBus;
    use crate::relay::OutboxRelay;
    use crate::storage::{MemoryStore, StoreError};
    use crate::worker::BackgroundWorker;

    use super::*;

    struct TestService {
        state: AppState,
        worker: BackgroundWorker<OutboxRelay>,
    }

    async fn service() -> TestService {
        let store = Arc::new(MemoryStore::new());
        store
            .put_tag(Tag {
                slug: "rust".to_string(),
                name: "Rust".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let bus = Arc::new(MemoryBus::default());
        let relay = OutboxRelay::new(store.clone(), bus);
        let worker = BackgroundWorker::start(relay, 60_000);
        let state = AppState {
            store,
            auth: Arc::new(AuthKeys::from_secret(b"test-secret")),
            relay: worker.handle(),
        };
        TestService { state, worker }
    }

    fn caller(id: &str) -> Identity {
        Identity {
            user_id: id.to_string(),
            display_name: format!("name-{id}"),
        }
    }

    fn new_question() -> NewQuestion {
        NewQuestion {
            title: "How do I frobnicate?".to_string(),
            content: "Details.".to_string(),
            tags: vec!["rust".to_string()],
        }
    }

    #[tokio::test]
    async fn create_returns_201_with_author_from_token() {
        let mut service = service().await;
        let (status, Json(question)) = create_question(
            State(service.state.clone()),
            caller("u1"),
            Json(new_question()),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(question.author_id, "u1");
        assert_eq!(question.author_name, "name-u1");
        service.worker.stop().await;
    }

    #[tokio::test]
    async fn create_with_unknown_tag_is_bad_request() {
        let mut service = service().await;
        let mut new = new_question();
        new.tags.push("ghost".to_string());

        let err = create_question(State(service.state.clone()), caller("u1"), Json(new))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Store(StoreError::UnknownTags(ref unknown)) if unknown == &vec!["ghost".to_string()]
        ));
        service.worker.stop().await;
    }

    #[tokio::test]
    async fn get_question_bumps_views_and_includes_answers() {
        let mut service = service().await;
        let (_, Json(question)) = create_question(
            State(service.state.clone()),
            caller("u1"),
            Json(new_question()),
        )
        .await
        .unwrap();
        add_answer(
            State(service.state.clone()),
            caller("u2"),
            Path(question.id),
            Json(NewAnswer {
                content: "An answer.".to_string(),
            }),
        )
        .await
        .unwrap();

        let Json(first) = get_question(State(service.state.clone()), Path(question.id))
            .await
            .unwrap();
        let Json(second) = get_question(State(service.state.clone()), Path(question.id))
            .await
            .unwrap();

        assert_eq!(first.question.views, 1);
        assert_eq!(second.question.views, 2);
        assert_eq!(second.answers.len(), 1);
        assert_eq!(second.question.answer_count, 1);
        service.worker.stop().await;
    }

    #[tokio::test]
    async fn non_owner_update_is_forbidden() {
        let mut service = service().await;
        let (_, Json(question)) = create_question(
            State(service.state.clone()),
            caller("owner"),
            Json(new_question()),
        )
        .await
        .unwrap();

        let err = update_question(
            State(service.state.clone()),
            caller("intruder"),
            Path(question.id),
            Json(UpdateQuestion {
                title: "x".to_string(),
                content: "x".to_string(),
                tags: vec![],
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Store(StoreError::NotOwner)));
        service.worker.stop().await;
    }

    #[tokio::test]
    async fn accept_and_delete_follow_state_rules() {
        let mut service = service().await;
        let (_, Json(question)) = create_question(
            State(service.state.clone()),
            caller("asker"),
            Json(new_question()),
        )
        .await
        .unwrap();
        let (_, Json(answer)) = add_answer(
            State(service.state.clone()),
            caller("helper"),
            Path(question.id),
            Json(NewAnswer {
                content: "a".to_string(),
            }),
        )
        .await
        .unwrap();

        let Json(accepted) = accept_answer(
            State(service.state.clone()),
            caller("asker"),
            Path((question.id, answer.id)),
        )
        .await
        .unwrap();
        assert!(accepted.accepted);

        // Deleting the accepted answer is rejected even for its author.
        let err = delete_answer(
            State(service.state.clone()),
            caller("helper"),
            Path((question.id, answer.id)),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Store(StoreError::AcceptedAnswerLocked)
        ));
        service.worker.stop().await;
    }

    #[tokio::test]
    async fn delete_question_returns_204_and_404_afterwards() {
        let mut service = service().await;
        let (_, Json(question)) = create_question(
            State(service.state.clone()),
            caller("u1"),
            Json(new_question()),
        )
        .await
        .unwrap();

        let status = delete_question(
            State(service.state.clone()),
            caller("u1"),
            Path(question.id),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = get_question(State(service.state.clone()), Path(question.id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Store(StoreError::QuestionNotFound)
        ));
        service.worker.stop().await;
    }

    #[tokio::test]
    async fn listing_respects_tag_filter_and_limit() {
        let mut service = service().await;
        for _ in 0..3 {
            create_question(
                State(service.state.clone()),
                caller("u1"),
                Json(new_question()),
            )
            .await
            .unwrap();
        }

        let Json(limited) = list_questions(
            State(service.state.clone()),
            Query(ListParams {
                tag: Some("rust".to_string()),
                limit: Some(2),
                offset: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(limited.len(), 2);

        let Json(none) = list_questions(
            State(service.state.clone()),
            Query(ListParams {
                tag: Some("python".to_string()),
                limit: None,
                offset: None,
            }),
        )
        .await
        .unwrap();
        assert!(none.is_empty());
        service.worker.stop().await;
    }

    #[tokio::test]
    async fn tags_endpoint_lists_seeded_tags() {
        let mut service = service().await;
        let Json(tags) = list_tags(State(service.state.clone())).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].slug, "rust");
        service.worker.stop().await;
    }
}
