use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use opsdesk_core::{
    collections::{Record, RecordCollection, RecordQuery},
    sync::{operation_commit, OperationCommit, SyncOperationRequest},
};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::{error::ApiResult, main_lib::AppState};

const INSERT_OPERATION: &str = "record_insert";
const UPDATE_OPERATION: &str = "record_update";
const DELETE_OPERATION: &str = "record_delete";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Accepted {
    operation_id: String,
}

fn payload_values(payload: &Value) -> Map<String, Value> {
    payload
        .get("values")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn payload_id(payload: &Value) -> String {
    payload
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn insert_commit(target: Arc<dyn RecordCollection>) -> OperationCommit {
    operation_commit(move |payload: Value| {
        let target = Arc::clone(&target);
        async move { target.insert(payload_values(&payload)).await.map(|_| ()) }
    })
}

fn update_commit(target: Arc<dyn RecordCollection>) -> OperationCommit {
    operation_commit(move |payload: Value| {
        let target = Arc::clone(&target);
        async move {
            target
                .update(&payload_id(&payload), payload_values(&payload))
                .await
                .map(|_| ())
        }
    })
}

fn delete_commit(target: Arc<dyn RecordCollection>) -> OperationCommit {
    operation_commit(move |payload: Value| {
        let target = Arc::clone(&target);
        async move { target.delete(&payload_id(&payload)).await }
    })
}

fn accepted(operation_id: String) -> (StatusCode, Json<Accepted>) {
    (StatusCode::ACCEPTED, Json(Accepted { operation_id }))
}

async fn list_records(
    Path(collection): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Record>>> {
    let records = state
        .collection(&collection)?
        .select(&RecordQuery::new())
        .await?;
    Ok(Json(records))
}

async fn create_record(
    Path(collection): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(values): Json<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<Accepted>)> {
    let target = state.collection(&collection)?;
    let request = SyncOperationRequest::new(
        INSERT_OPERATION,
        json!({ "collection": collection, "values": values }),
    )
    .with_commit(insert_commit(target));
    Ok(accepted(state.sync_bus.enqueue(request)))
}

async fn update_record(
    Path((collection, id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    Json(values): Json<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<Accepted>)> {
    let target = state.collection(&collection)?;
    let request = SyncOperationRequest::new(
        UPDATE_OPERATION,
        json!({ "collection": collection, "id": id, "values": values }),
    )
    .with_commit(update_commit(target));
    Ok(accepted(state.sync_bus.enqueue(request)))
}

async fn delete_record(
    Path((collection, id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<Accepted>)> {
    let target = state.collection(&collection)?;
    let request = SyncOperationRequest::new(
        DELETE_OPERATION,
        json!({ "collection": collection, "id": id }),
    )
    .with_commit(delete_commit(target));
    Ok(accepted(state.sync_bus.enqueue(request)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/collections/{collection}/records",
            post(create_record).get(list_records),
        )
        .route(
            "/collections/{collection}/records/{id}",
            put(update_record).delete(delete_record),
        )
}
