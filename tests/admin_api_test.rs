// Integration tests for GET/PUT /api/admin/config

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use sceneloop::api::{create_admin_router, AdminAppState};
use sceneloop::config::{RuntimeConfig, SharedRuntimeConfig};
use std::sync::{Arc, RwLock};
use tower::ServiceExt;

fn shared_defaults() -> SharedRuntimeConfig {
    Arc::new(RwLock::new(RuntimeConfig::default()))
}

fn create_test_app(runtime_config: SharedRuntimeConfig, admin_token: Option<&str>) -> Router {
    create_admin_router(AdminAppState {
        runtime_config,
        admin_token: admin_token.map(|t| t.to_string()),
    })
}

fn put_request(body: serde_json::Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("PUT")
        .uri("/api/admin/config")
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// GET /api/admin/config returns default values.
#[tokio::test]
async fn test_get_config_returns_defaults() {
    let app = create_test_app(shared_defaults(), None);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/admin/config")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cfg = json_body(response).await;
    let defaults = RuntimeConfig::default();
    assert_eq!(cfg["max_sessions"], defaults.max_sessions);
    assert_eq!(cfg["max_commands_per_request"], defaults.max_commands_per_request);
    assert_eq!(cfg["max_queue_per_role"], defaults.max_queue_per_role);
}

/// PUT /api/admin/config updates all fields and the shared config reflects them.
#[tokio::test]
async fn test_put_config_updates_fields() {
    let shared = shared_defaults();
    let app = create_test_app(shared.clone(), Some("secret"));

    let body = serde_json::json!({
        "max_sessions": 4,
        "max_commands_per_request": 8,
        "max_queue_per_role": 16,
    });
    let response = app.oneshot(put_request(body, Some("secret"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cfg = json_body(response).await;
    assert_eq!(cfg["max_sessions"], 4);
    assert_eq!(cfg["max_queue_per_role"], 16);

    let stored = shared.read().unwrap();
    assert_eq!(stored.max_sessions, 4);
    assert_eq!(stored.max_commands_per_request, 8);
    assert_eq!(stored.max_queue_per_role, 16);
}

/// PUT with partial body only updates specified fields.
#[tokio::test]
async fn test_put_config_partial_update() {
    let shared = shared_defaults();
    let app = create_test_app(shared.clone(), Some("secret"));

    let body = serde_json::json!({ "max_sessions": 2 });
    let response = app.oneshot(put_request(body, Some("secret"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = shared.read().unwrap();
    let defaults = RuntimeConfig::default();
    assert_eq!(stored.max_sessions, 2);
    assert_eq!(stored.max_commands_per_request, defaults.max_commands_per_request);
    assert_eq!(stored.max_queue_per_role, defaults.max_queue_per_role);
}

#[tokio::test]
async fn test_put_config_wrong_token_returns_401() {
    let app = create_test_app(shared_defaults(), Some("correct-token"));
    let body = serde_json::json!({ "max_sessions": 2 });

    let response = app.oneshot(put_request(body, Some("wrong-token"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Unauthorized");
}

#[tokio::test]
async fn test_put_config_missing_token_returns_401() {
    let app = create_test_app(shared_defaults(), Some("secret"));
    let body = serde_json::json!({ "max_sessions": 2 });

    let response = app.oneshot(put_request(body, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Without a configured admin token the config cannot be changed at all.
#[tokio::test]
async fn test_put_config_disabled_without_admin_token() {
    let shared = shared_defaults();
    let app = create_test_app(shared.clone(), None);
    let body = serde_json::json!({ "max_sessions": 2 });

    let response = app.oneshot(put_request(body, Some("anything"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(shared.read().unwrap().max_sessions, RuntimeConfig::default().max_sessions);
}

#[tokio::test]
async fn test_put_config_rejects_zero_limits() {
    let shared = shared_defaults();
    let app = create_test_app(shared.clone(), Some("secret"));
    let body = serde_json::json!({ "max_queue_per_role": 0 });

    let response = app.oneshot(put_request(body, Some("secret"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        shared.read().unwrap().max_queue_per_role,
        RuntimeConfig::default().max_queue_per_role
    );
}
