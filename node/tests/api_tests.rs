mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{csv_line, harness, Harness};
use plcscope_node::query::QueryService;
use plcscope_node::server::{build_router, AppState};
use serde_json::Value;
use tower::ServiceExt; // for oneshot

fn router(h: &Harness) -> Router {
    build_router(AppState {
        query: Arc::new(QueryService::new(h.sessions.clone())),
        files: h.files.clone(),
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, Body::empty()).await
}

/// Uploads `body`, starts a parse and waits for it to settle.
async fn parsed_session(h: &Harness, app: &Router, body: String) -> String {
    let (status, stored) = send(app, "PUT", "/api/files?name=line.csv", Body::from(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stored["name"], "line.csv");
    let file_id = stored["fileId"].as_str().unwrap().to_string();

    let request = serde_json::json!({ "fileId": file_id }).to_string();
    let (status, created) = send(app, "POST", "/api/parse", Body::from(request)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = created["sessionId"].as_str().unwrap().to_string();
    h.sessions.wait_settled(&id).await.unwrap();
    id
}

fn sample_log() -> String {
    let mut body = String::new();
    for i in 0..6 {
        let signal = if i % 2 == 0 { "Ready" } else { "Mode" };
        let value = if i % 2 == 0 { "true".to_string() } else { format!("STEP{}", i) };
        body.push_str(&csv_line(i * 30_000, "Cell/Robot-01", signal, &value));
    }
    body
}

#[tokio::test]
async fn test_parse_and_query_over_http() {
    let h = harness(|_| {});
    let app = router(&h);
    let id = parsed_session(&h, &app, sample_log()).await;

    let (status, session) = get(&app, &format!("/api/parse/{}/status", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["status"], "complete");
    assert_eq!(session["entryCount"], 6);
    assert_eq!(session["serverSide"], false);
    let start = session["startTime"].as_i64().unwrap();

    let (status, page) = get(&app, &format!("/api/parse/{}/entries?page=2&pageSize=4", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 6);
    assert_eq!(page["entries"].as_array().unwrap().len(), 2);

    let (_, page) = get(&app, &format!("/api/parse/{}/entries?search=step&pageSize=4", id)).await;
    assert_eq!(page["total"], 3);

    let (status, chunk) = get(
        &app,
        &format!("/api/parse/{}/chunk?start={}&end={}&signals=Robot-01::Ready", id, start, start + 90_000),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chunk = chunk.as_array().unwrap();
    assert_eq!(chunk.len(), 2);
    assert_eq!(chunk[0]["value"], true);
    assert_eq!(chunk[0]["signalType"], "boolean");

    let (_, bounds) = get(
        &app,
        &format!(
            "/api/parse/{}/chunk/boundaries?start={}&end={}&signals=Robot-01::Mode",
            id,
            start + 40_000,
            start + 80_000
        ),
    )
    .await;
    assert_eq!(bounds["before"]["Robot-01::Mode"]["value"], "STEP1");
    assert_eq!(bounds["after"]["Robot-01::Mode"]["value"], "STEP3");

    let (_, signals) = get(&app, &format!("/api/parse/{}/signals", id)).await;
    assert_eq!(signals, serde_json::json!(["Robot-01::Mode", "Robot-01::Ready"]));

    let (_, types) = get(&app, &format!("/api/parse/{}/signals/types", id)).await;
    assert_eq!(types["Robot-01::Mode"], "string");

    let (_, tree) = get(&app, &format!("/api/parse/{}/timetree", id)).await;
    assert_eq!(tree.as_array().unwrap().len(), 3);

    let (_, values) = get(&app, &format!("/api/parse/{}/values?ts={}", id, start + 100_000)).await;
    let values = values.as_array().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0]["signalName"], "Mode");
    assert_eq!(values[0]["value"], "STEP3");

    let (_, index) = get(&app, &format!("/api/parse/{}/index?ts={}", id, start + 45_000)).await;
    assert_eq!(index["index"], 2);

    let (status, all) = get(&app, &format!("/api/parse/{}/all", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_error_mapping() {
    let h = harness(|_| {});
    let app = router(&h);
    let id = parsed_session(&h, &app, sample_log()).await;

    let (status, body) = get(&app, "/api/parse/unknown-session/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SESSION_NOT_FOUND");

    let (status, body) = get(&app, &format!("/api/parse/{}/chunk?start=10&end=5", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_RANGE");

    let (status, body) = get(&app, &format!("/api/parse/{}/entries?search=(oops&regex=true", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_FILTER");

    let request = serde_json::json!({ "fileId": "nope" }).to_string();
    let (status, body) = send(&app, "POST", "/api/parse", Body::from(request)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "FILE_NOT_FOUND");
}

#[tokio::test]
async fn test_keepalive_and_delete() {
    let h = harness(|_| {});
    let app = router(&h);
    let id = parsed_session(&h, &app, sample_log()).await;

    let (status, _) = send(&app, "POST", &format!("/api/parse/{}/keepalive", id), Body::empty()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", &format!("/api/parse/{}", id), Body::empty()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = get(&app, &format!("/api/parse/{}/entries", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_health() {
    let h = harness(|_| {});
    let app = router(&h);
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}
