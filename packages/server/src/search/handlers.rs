//! `GET /search` handler.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use askstack_core::document::SearchDocument;

use crate::error::ApiError;

use super::index::SearchIndex;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Clone)]
pub struct SearchState {
    pub index: Arc<SearchIndex>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    /// Full-text query over title and content. Empty matches everything.
    #[serde(default)]
    pub q: String,
    /// Exact tag-slug filter.
    pub tag: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub score: f32,
    #[serde(flatten)]
    pub document: SearchDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    /// Total matches, which may exceed `results.len()` when limited.
    pub total_count: usize,
}

pub async fn search(
    State(state): State<SearchState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let (hits, total_count) = state
        .index
        .search(&params.q, params.tag.as_deref(), limit)
        .map_err(ApiError::Internal)?;

    Ok(Json(SearchResponse {
        results: hits
            .into_iter()
            .map(|hit| SearchHit {
                score: hit.score,
                document: hit.document,
            })
            .collect(),
        total_count,
    }))
}

/// Routes served by the search service.
pub fn router(state: SearchState) -> Router {
    Router::new()
        .route("/search", get(search))
        .with_state(state)
}
