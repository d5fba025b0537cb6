// Integration tests for state stream auth enforcement
//
// Auth runs as a route layer (stream_auth) before WebSocket upgrade
// extraction, so rejections come back as plain JSON errors.
//
// Note: Tests use tower::ServiceExt::oneshot. When auth passes, requests reach
// the WebSocketUpgrade extractor, which returns 426 (no hyper OnUpgrade extension
// in test requests). The tests verify the auth decision, not the upgrade itself.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use sceneloop::api::{create_stream_router, SessionAppState};
use sceneloop::config::{RuntimeConfig, SessionsConfig};
use sceneloop::interpreter::ActionRegistry;
use sceneloop::scene::SceneSpec;
use sceneloop::session::{CreatedSession, Game, SessionManager, SessionOptions};
use sceneloop::store::SqliteStore;
use std::sync::{Arc, RwLock};
use tower::ServiceExt;

fn make_router() -> (Router, CreatedSession) {
    let scene = SceneSpec::from_json(
        r#"{ "roles": [{ "id": "p1", "kind": "human" }], "multiplayer": { "tick_rate": 20 } }"#,
    )
    .unwrap();
    let game = Game::new(scene, ActionRegistry::new()).unwrap();
    let manager = Arc::new(SessionManager::new(
        game,
        Arc::new(SqliteStore::new(":memory:").unwrap()),
        SessionsConfig::default(),
        Arc::new(RwLock::new(RuntimeConfig::default())),
    ));
    let created = manager.create(SessionOptions::default()).unwrap();
    let router = create_stream_router(Arc::new(SessionAppState {
        manager,
        admin_token: None,
    }));
    (router, created)
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_no_token_returns_401() {
    let (app, created) = make_router();
    let uri = format!("/api/sessions/{}/stream", created.session_id);
    let resp = app.oneshot(get_request(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_token_returns_401() {
    let (app, created) = make_router();
    let uri = format!("/api/sessions/{}/stream?token=not-a-real-token", created.session_id);
    let resp = app.oneshot(get_request(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_session_returns_404() {
    let (app, created) = make_router();
    let uri = format!("/api/sessions/missing/stream?token={}", created.admin_token);
    let resp = app.oneshot(get_request(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_token_in_query_not_rejected() {
    let (app, created) = make_router();
    let uri = format!(
        "/api/sessions/{}/stream?token={}",
        created.session_id, created.roles["p1"]
    );
    let resp = app.oneshot(get_request(&uri)).await.unwrap();
    // Middleware passes; WebSocket extractor fails with 426 (test artifact, not 401)
    assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_ne!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_token_in_header_not_rejected() {
    let (app, created) = make_router();
    let req = Request::builder()
        .uri(format!("/api/sessions/{}/stream", created.session_id))
        .header("Authorization", format!("Bearer {}", created.admin_token))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
}
