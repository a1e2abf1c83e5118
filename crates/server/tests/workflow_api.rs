use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use router_core::{CallbackSink, InMemoryResponseCache, ResponseCache, RouteRegistry, RouterConfig, RouterCore};
use router_db::test_utils::setup_test_pool;
use router_db::SqliteSubmissionStore;
use router_db::SubmissionStore;
use router_drivers::{DriverSelector, EndpointDriver, StubDriver};
use router_server::state::AppState;
use router_utils::route_config::RouteConfigDoc;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct Harness {
    app: axum::Router,
    stub: Arc<StubDriver>,
    _tempdir: TempDir,
}

async fn harness() -> Harness {
    let (pool, tempdir) = setup_test_pool().await;
    let store: Arc<dyn SubmissionStore> = Arc::new(SqliteSubmissionStore::new(pool));

    let doc: RouteConfigDoc = toml::from_str(
        r#"
[[route]]
routeId = "R1"
endpointType = "STUB"
endpointUrl = "stub://local"
statusThresholdSeconds = 1
"#,
    )
    .unwrap();
    let registry = Arc::new(RouteRegistry::new(&doc).unwrap());

    let stub = Arc::new(StubDriver::new());
    let mut drivers: HashMap<String, Arc<dyn EndpointDriver>> = HashMap::new();
    drivers.insert("STUB".to_string(), stub.clone());
    let selector = Arc::new(DriverSelector::new(drivers));

    let cache: Arc<dyn ResponseCache> = Arc::new(InMemoryResponseCache::new());

    let core = Arc::new(RouterCore::new(
        registry,
        store,
        selector,
        cache,
        RouterConfig::default(),
    ));
    let callback_sink = Arc::new(CallbackSink::new(core.clone()));

    let app = router_server::routes::router(AppState { core, callback_sink });

    Harness {
        app,
        stub,
        _tempdir: tempdir,
    }
}

#[tokio::test]
async fn health_check_reports_ok() {
    let harness = harness().await;
    let response = harness
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn submit_to_unknown_route_is_rejected() {
    let harness = harness().await;
    let request = Request::builder()
        .method("POST")
        .uri("/workflows/submit?routeId=missing&workflowId=wf-1")
        .header("content-type", "application/json")
        .body(Body::from(json!({}).to_string()))
        .unwrap();
    let response = harness.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submit_then_fetch_status_round_trips() {
    let harness = harness().await;

    let submit_request = Request::builder()
        .method("POST")
        .uri("/workflows/submit?routeId=R1&workflowId=wf-1")
        .header("content-type", "application/json")
        .body(Body::from(json!({"key": "value"}).to_string()))
        .unwrap();
    let submit_response = harness.app.clone().oneshot(submit_request).await.unwrap();
    assert_eq!(submit_response.status(), StatusCode::OK);

    let body = submit_response.into_body().collect().await.unwrap().to_bytes();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    let submission_id = parsed["submissionId"].as_str().unwrap().to_string();

    let status_request = Request::builder()
        .uri(format!("/workflows/status/{submission_id}"))
        .body(Body::empty())
        .unwrap();
    let status_response = harness.app.clone().oneshot(status_request).await.unwrap();
    assert_eq!(status_response.status(), StatusCode::OK);

    let status_body = status_response.into_body().collect().await.unwrap().to_bytes();
    let status: Value = serde_json::from_slice(&status_body).unwrap();
    assert_eq!(status["submissionId"], submission_id);
    assert_eq!(status["status"], "QUEUED");
    assert_eq!(harness.stub.submit_call_count(), 1);
}

#[tokio::test]
async fn status_for_unknown_submission_is_404() {
    let harness = harness().await;
    let request = Request::builder()
        .uri("/workflows/status/does-not-exist")
        .body(Body::empty())
        .unwrap();
    let response = harness.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn by_period_query_returns_submitted_rows() {
    let harness = harness().await;

    let submit_request = Request::builder()
        .method("POST")
        .uri("/workflows/submit?routeId=R1&workflowId=wf-period")
        .header("content-type", "application/json")
        .body(Body::from(json!({}).to_string()))
        .unwrap();
    let submit_response = harness.app.clone().oneshot(submit_request).await.unwrap();
    assert_eq!(submit_response.status(), StatusCode::OK);

    use chrono::SecondsFormat;
    let from = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let to = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let period_request = Request::builder()
        .uri(format!(
            "/workflows/status?from={from}&to={to}&routeId=R1&workflowId=wf-period"
        ))
        .body(Body::empty())
        .unwrap();
    let period_response = harness.app.clone().oneshot(period_request).await.unwrap();
    assert_eq!(period_response.status(), StatusCode::OK);

    let body = period_response.into_body().collect().await.unwrap().to_bytes();
    let rows: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn callback_with_unknown_route_is_rejected() {
    let harness = harness().await;
    let request = Request::builder()
        .method("POST")
        .uri("/workflows/callback?routeId=missing")
        .body(Body::from("some-submission-id"))
        .unwrap();
    let response = harness.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
