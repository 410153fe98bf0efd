//! Integration tests for the ingestion HTTP surface.
//!
//! Exercises the full router (middleware included) with the in-memory
//! store and broker, via `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use attest_core::config::{BatcherConfig, ServerConfig};
use attest_db::{MemoryStore, StatusStore};
use attest_ingest::routes::build_router;
use attest_ingest::{AppState, Batcher, ReceiptService};
use attest_queue::Broker;

const HELLO_HASH: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    broker: Arc<Broker>,
    cancel: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the app with a batch size of one so every accepted submission
/// flushes immediately.
fn test_app() -> TestApp {
    let cancel = CancellationToken::new();
    let store = Arc::new(MemoryStore::new());
    let broker = Broker::new(4, 100);

    let cfg = BatcherConfig {
        batch_size: 1,
        batch_timeout: Duration::from_millis(10),
        ..BatcherConfig::default()
    };
    let (batcher, _tasks) = Batcher::start(
        cfg,
        store.clone() as Arc<dyn StatusStore>,
        Arc::new(broker.producer()),
        cancel.clone(),
    );

    let state = AppState {
        service: Arc::new(ReceiptService::new(batcher)),
        store: store.clone(),
    };
    let router = build_router(state, &ServerConfig::default());

    TestApp {
        router,
        store,
        broker,
        cancel,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post_json(
    app: &TestApp,
    uri: &str,
    body: serde_json::Value,
    org_header: Option<&str>,
) -> axum::response::Response {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(org) = org_header {
        builder = builder.header("x-client-org-id", org);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

async fn get(app: &TestApp, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Test: happy-path receipt
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_202_with_receipt() {
    let app = test_app();
    let response = post_json(
        &app,
        "/v1/logs",
        serde_json::json!({ "log_content": "hello" }),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["server_log_hash"], HELLO_HASH);
    assert_eq!(json["status"], "ACCEPTED");
    assert_eq!(json["request_id"].as_str().unwrap().len(), 36);
    assert!(json["server_received_timestamp"].is_string());

    // The record becomes durable shortly after: one row, one queue message.
    wait_for("the row to land", || app.store.len() == 1).await;
    assert_eq!(app.broker.depth(), 1);
}

// ---------------------------------------------------------------------------
// Test: validation failures map to 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_content_is_rejected_with_400() {
    let app = test_app();
    let response = post_json(
        &app,
        "/v1/logs",
        serde_json::json!({ "log_content": "" }),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "EMPTY_CONTENT");
    assert_eq!(app.store.len(), 0);
}

#[tokio::test]
async fn mismatched_client_hash_is_rejected_with_400() {
    let app = test_app();
    let response = post_json(
        &app,
        "/v1/logs",
        serde_json::json!({
            "log_content": "hello",
            "client_log_hash": "deadbeef",
        }),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "HASH_MISMATCH");
}

#[tokio::test]
async fn matching_client_hash_is_accepted() {
    let app = test_app();
    let response = post_json(
        &app,
        "/v1/logs",
        serde_json::json!({
            "log_content": "hello",
            "client_log_hash": HELLO_HASH,
        }),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

// ---------------------------------------------------------------------------
// Test: org id precedence (header over body)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn org_header_wins_over_body_field() {
    let app = test_app();
    let response = post_json(
        &app,
        "/v1/logs",
        serde_json::json!({
            "log_content": "org precedence",
            "client_source_org_id": "body-org",
        }),
        Some("header-org"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    let request_id = json["request_id"].as_str().unwrap().to_string();

    wait_for("the row to land", || app.store.len() == 1).await;
    let row = app
        .store
        .find_by_request_id(&request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.source_org_id, "header-org");
}

// ---------------------------------------------------------------------------
// Test: health and general HTTP behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app();
    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["db_healthy"], true);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = test_app();
    let response = get(&app, "/this-route-does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_a_request_id_header() {
    let app = test_app();
    let response = get(&app, "/health").await;
    let request_id = response.headers().get("x-request-id");
    assert!(request_id.is_some(), "x-request-id header must be present");
}
