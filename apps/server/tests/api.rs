use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use opsdesk_server::{api::app_router, build_state, config::Config, AppState};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

async fn build_test_app() -> (Router, Arc<AppState>, TempDir) {
    let tmp = tempdir().unwrap();
    let config = Config::with_data_dir(tmp.path().to_string_lossy());
    let state = build_state(&config).await.unwrap();
    (app_router(state.clone(), &config), state, tmp)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_responds_ok() {
    let (app, _state, _tmp) = build_test_app().await;
    let response = send(&app, Method::GET, "/api/v1/healthz", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn queued_writes_feed_the_merged_client_list() {
    let (app, state, _tmp) = build_test_app().await;

    let response = send(
        &app,
        Method::POST,
        "/api/v1/collections/clients/records",
        Some(json!({"name": "Acme", "industry": "Retail"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(json_body(response).await["operationId"].is_string());

    let response = send(
        &app,
        Method::POST,
        "/api/v1/collections/submissions/records",
        Some(json!({"client_name": "acme", "phone": "555-0100"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    state.sync_bus.wait_idle().await;

    let response = send(&app, Method::GET, "/api/v1/clients/merged", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let merged = json_body(response).await;
    let merged = merged.as_array().unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0]["industry"], "Retail");
    assert_eq!(merged[0]["phone"], "555-0100");
    assert_eq!(merged[0]["dataSource"], "registry");
    assert_eq!(merged[0]["hasHighestTierData"], false);
}

#[tokio::test]
async fn merge_uses_posted_registry_rows() {
    let (app, _state, _tmp) = build_test_app().await;

    let response = send(
        &app,
        Method::POST,
        "/api/v1/clients/merge",
        Some(json!({
            "reported": {"client_name": "Beta", "industry": "Retail"},
            "registry": [{"name": "beta", "website_url": "https://beta.example"}]
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let merged = json_body(response).await;
    assert_eq!(merged["website"], "https://beta.example");
    assert_eq!(merged["industry"], "Retail");
    assert_eq!(merged["dataSource"], "registry");
}

#[tokio::test]
async fn merge_rejects_nameless_reported_view() {
    let (app, _state, _tmp) = build_test_app().await;
    let response = send(
        &app,
        Method::POST,
        "/api/v1/clients/merge",
        Some(json!({"reported": {"industry": "Retail"}})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_collection_is_a_bad_request() {
    let (app, _state, _tmp) = build_test_app().await;
    let response = send(
        &app,
        Method::POST,
        "/api/v1/collections/invoices/records",
        Some(json!({"name": "Acme"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summary_without_self_reported_data() {
    let (app, _state, _tmp) = build_test_app().await;
    let response = send(&app, Method::GET, "/api/v1/clients/Acme/summary", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await;
    assert_eq!(summary["clientName"], "Acme");
    assert_eq!(summary["hasHighestTierData"], false);

    let response = send(&app, Method::GET, "/api/v1/clients/Acme/self-reported", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn draft_edits_are_debounced_until_flush() {
    let (app, _state, _tmp) = build_test_app().await;
    let draft = json!({"employee": {"name": "Ana"}, "clients": []});

    let response = send(
        &app,
        Method::PUT,
        "/api/v1/drafts/employee_form_ana_555_2025-06?priority=slow",
        Some(draft.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = send(&app, Method::POST, "/api/v1/drafts/flush", None).await;
    assert_eq!(json_body(response).await["flushed"], 1);

    let response = send(
        &app,
        Method::GET,
        "/api/v1/drafts/employee_form_ana_555_2025-06",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, draft);

    let response = send(
        &app,
        Method::DELETE,
        "/api/v1/drafts/employee_form_ana_555_2025-06",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(
        &app,
        Method::GET,
        "/api/v1/drafts/employee_form_ana_555_2025-06",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn explicit_draft_save_is_immediately_readable() {
    let (app, _state, _tmp) = build_test_app().await;
    let draft = json!({"meta": {"month": "2025-06"}});

    let response = send(
        &app,
        Method::POST,
        "/api/v1/drafts/employee_form_bo_777_2025-06/save",
        Some(draft.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(
        &app,
        Method::GET,
        "/api/v1/drafts/employee_form_bo_777_2025-06",
        None,
    )
    .await;
    assert_eq!(json_body(response).await, draft);
}

#[tokio::test]
async fn invalid_priority_is_rejected() {
    let (app, _state, _tmp) = build_test_app().await;
    let response = send(
        &app,
        Method::PUT,
        "/api/v1/drafts/employee_form_ana_555_2025-06?priority=urgent",
        Some(json!({"meta": {}})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_report_completed_operations() {
    let (app, state, _tmp) = build_test_app().await;

    send(
        &app,
        Method::POST,
        "/api/v1/collections/client_onboarding/records",
        Some(json!({"client_name": "Acme"})),
    )
    .await;
    state.sync_bus.wait_idle().await;

    let response = send(&app, Method::GET, "/api/v1/sync/stats", None).await;
    let stats = json_body(response).await;
    assert_eq!(stats["succeeded"], 1);
    assert_eq!(stats["failed"], 0);
    assert_eq!(stats["queued"], 0);
}
