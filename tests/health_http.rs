mod common;

use axum::http::{Method, StatusCode};

use common::app::spawn_test_server;
use common::http::{call, request, response_json};

#[tokio::test]
async fn it_health_live_and_ready() {
    let app = spawn_test_server().await;

    let live = request(&app.app, Method::GET, "/health/live", None, &[]).await;
    let (live_status, _, _) = response_json(live).await;
    assert_eq!(live_status, StatusCode::OK);

    let ready = request(&app.app, Method::GET, "/health/ready", None, &[]).await;
    let (ready_status, _, _) = response_json(ready).await;
    assert_eq!(ready_status, StatusCode::OK);
}

#[tokio::test]
async fn it_health_reports_store_and_worker() {
    let app = spawn_test_server().await;

    let (status, body) = call(&app.app, Method::GET, "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["leader"], false);

    let (status, body) = call(&app.app, Method::GET, "/health/database", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["items"], 0);

    let (status, body) = call(&app.app, Method::GET, "/health/worker", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["runs"], 0);
    assert_eq!(body["stats"]["priorityRunActive"], false);
}

#[tokio::test]
async fn it_responses_carry_request_id() {
    let app = spawn_test_server().await;

    let resp = request(&app.app, Method::GET, "/health", None, &[]).await;
    let (_, headers, _) = response_json(resp).await;
    assert!(headers.contains_key("x-request-id"));
}
