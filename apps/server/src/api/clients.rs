use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use opsdesk_core::{
    clients::{
        ClientSource, ClientSummary, ClientTier, ClientView, CollectionClientSource,
        MergedClientView,
    },
    collections::{REGISTRY_COLLECTION, REPORTED_BY_OTHER_COLLECTION},
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergeRequest {
    reported: Map<String, Value>,
    /// Registry rows to merge against; read from the registry collection when absent.
    registry: Option<Vec<Map<String, Value>>>,
}

async fn load_views(
    state: &AppState,
    collection: &str,
    tier: ClientTier,
) -> ApiResult<Vec<ClientView>> {
    let source = CollectionClientSource::new(state.collection(collection)?, tier);
    Ok(source.fetch_all().await?)
}

async fn list_merged_clients(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<MergedClientView>>> {
    let reported =
        load_views(&state, REPORTED_BY_OTHER_COLLECTION, ClientTier::ReportedByOther).await?;
    let registry = load_views(&state, REGISTRY_COLLECTION, ClientTier::Registry).await?;
    let merged = state.merge_service.merge_many(&reported, &registry).await;
    Ok(Json(merged))
}

async fn merge_client(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<Json<MergedClientView>> {
    let reported = ClientView::from_values(ClientTier::ReportedByOther, &request.reported)?;
    let registry = match request.registry {
        Some(rows) => rows
            .iter()
            .map(|row| ClientView::from_values(ClientTier::Registry, row))
            .collect::<Result<Vec<_>, _>>()?,
        None => load_views(&state, REGISTRY_COLLECTION, ClientTier::Registry).await?,
    };
    let merged = state.merge_service.merge_one(&reported, &registry).await;
    Ok(Json(merged))
}

async fn get_self_reported(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ClientView>> {
    let view = state
        .merge_service
        .get_entity_by_name(&name)
        .await
        .ok_or(ApiError::NotFound)?;
    Ok(Json(view.as_ref().clone()))
}

async fn get_client_summary(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ClientSummary>> {
    let summary = state
        .merge_service
        .get_summary(&name)
        .await
        .ok_or(ApiError::NotFound)?;
    Ok(Json(summary))
}

async fn invalidate_cache(State(state): State<Arc<AppState>>) -> StatusCode {
    state.merge_service.invalidate();
    StatusCode::NO_CONTENT
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/clients/merged", get(list_merged_clients))
        .route("/clients/merge", post(merge_client))
        .route("/clients/cache/invalidate", post(invalidate_cache))
        .route("/clients/{name}/self-reported", get(get_self_reported))
        .route("/clients/{name}/summary", get(get_client_summary))
}
