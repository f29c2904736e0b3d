//! Service error type and its HTTP mapping.
//!
//! Every handler returns [`ApiError`] on failure; the `IntoResponse` impl
//! turns it into a status code plus a small JSON body. Broker publish
//! failures never appear here: the outbox relay absorbs and retries them,
//! so an HTTP response can never report failure for a write that already
//! committed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("upstream request failed: {0}")]
    Upstream(#[source] anyhow::Error),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Store(err) => match err {
                StoreError::QuestionNotFound | StoreError::AnswerNotFound => {
                    StatusCode::NOT_FOUND
                }
                StoreError::NotOwner => StatusCode::FORBIDDEN,
                StoreError::UnknownTags(_)
                | StoreError::InvalidSlug(_)
                | StoreError::AlreadyAccepted
                | StoreError::AcceptedAnswerLocked => StatusCode::BAD_REQUEST,
                StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
