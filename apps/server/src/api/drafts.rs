use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use opsdesk_core::scheduler::UpdatePriority;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

#[derive(Deserialize)]
struct EditQuery {
    priority: Option<String>,
}

#[derive(Serialize)]
struct Flushed {
    flushed: usize,
}

async fn get_draft(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Value>> {
    let draft = state.autosave.load(&key).await.ok_or(ApiError::NotFound)?;
    Ok(Json(draft))
}

/// Debounced save: the edit is committed once its priority window passes.
async fn edit_draft(
    Path(key): Path<String>,
    Query(query): Query<EditQuery>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> ApiResult<StatusCode> {
    let priority = match query.priority.as_deref() {
        Some(raw) => raw
            .parse::<UpdatePriority>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => UpdatePriority::default(),
    };
    state.autosave.edit(&key, payload, priority);
    Ok(StatusCode::ACCEPTED)
}

/// Explicit save: persistence failure is reported to the caller.
async fn save_draft(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> ApiResult<StatusCode> {
    if state.autosave.save_now(&key, &payload).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Internal(format!("Draft '{}' could not be saved", key)))
    }
}

async fn discard_draft(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
) -> StatusCode {
    state.autosave.discard(&key).await;
    StatusCode::NO_CONTENT
}

async fn flush_drafts(State(state): State<Arc<AppState>>) -> Json<Flushed> {
    let flushed = state.autosave.flush().await;
    Json(Flushed { flushed })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drafts/flush", post(flush_drafts))
        .route(
            "/drafts/{key}",
            get(get_draft).put(edit_draft).delete(discard_draft),
        )
        .route("/drafts/{key}/save", post(save_draft))
}
