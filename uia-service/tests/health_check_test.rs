mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn health_reports_live_session_count() {
    let app = TestApp::spawn_dummy().await;

    let response = app
        .request(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::read_json(response).await;
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["service"], json!("uia-service-test"));
    assert_eq!(body["active_sessions"], json!(0));

    // Opening an auth session moves the gauge.
    app.open_session(&json!({ "username": "user" })).await;

    let response = app
        .request(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let body = common::read_json(response).await;
    assert_eq!(body["active_sessions"], json!(1));
}

#[tokio::test]
async fn responses_carry_correlation_and_security_headers() {
    let app = TestApp::spawn_dummy().await;

    let response = app
        .request(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response
            .headers()
            .get("x-content-type-options")
            .and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );

    // A caller-supplied id is echoed back untouched.
    let response = app
        .request(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "corr-1234")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("corr-1234")
    );
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::spawn_dummy().await;

    let response = app
        .request(
            Request::builder()
                .uri("/.well-known/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::read_json(response).await;
    assert!(body["paths"]["/register"].is_object());
    assert!(body["paths"]["/auth/{stage}/fallback/web"].is_object());
    assert!(body["paths"]["/health"].is_object());
}
