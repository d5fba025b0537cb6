use crate::auth::resolve_token;
use crate::error::SessionError;
use crate::runtime::Pace;
use crate::scene::ToolSpec;
use crate::session::{
    CreatedSession, JoinedRole, PaceUpdate, SessionCommand, SessionManager, SessionOptions,
    SessionStateView, SessionStatus, SubmitResult, Viewer,
};
use crate::symbolic::SymbolicFrame;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Shared state for the session API and state stream
pub struct SessionAppState {
    pub manager: Arc<SessionManager>,
    /// Required bearer token for POST /api/sessions. None = open creation.
    pub admin_token: Option<String>,
}

/// `?token=` on any session route
#[derive(Deserialize, Default)]
pub(crate) struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Deserialize)]
struct JoinRequest {
    invite: String,
}

#[derive(Deserialize)]
struct CommandsRequest {
    commands: Vec<SessionCommand>,
    #[serde(default)]
    tick: bool,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub session_id: String,
    pub status: SessionStatus,
}

pub fn create_session_router(state: Arc<SessionAppState>) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", delete(remove_session))
        .route("/api/sessions/:id/join", post(join_session))
        .route("/api/sessions/:id/start", post(start_session))
        .route("/api/sessions/:id/stop", post(stop_session))
        .route("/api/sessions/:id/pace", put(update_pace))
        .route("/api/sessions/:id/commands", post(submit_commands))
        .route("/api/sessions/:id/frame", get(get_frame))
        .route("/api/sessions/:id/state", get(get_state))
        .route("/api/sessions/:id/tools", get(get_tools))
        .with_state(state)
}

/// Empty bodies are allowed everywhere a body is optional
fn parse_body(bytes: &Bytes) -> Result<Option<Value>, SessionError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| SessionError::Validation(format!("Invalid JSON body: {}", e)))
}

fn decode<T: DeserializeOwned + Default>(body: Option<&Value>) -> Result<T, SessionError> {
    match body {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| SessionError::Validation(format!("Invalid request: {}", e))),
        None => Ok(T::default()),
    }
}

fn authorize(
    state: &SessionAppState,
    session_id: &str,
    headers: &HeaderMap,
    query: &TokenQuery,
    body: Option<&Value>,
) -> Result<Viewer, SessionError> {
    let token = resolve_token(headers, query.token.as_deref(), body)
        .map_err(|_| SessionError::Unauthorized)?;
    state.manager.authorize(session_id, &token)
}

/// POST /api/sessions - Create a session
async fn create_session(
    State(state): State<Arc<SessionAppState>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<CreatedSession>, SessionError> {
    let body = parse_body(&body)?;

    if let Some(ref expected) = state.admin_token {
        let provided = resolve_token(&headers, query.token.as_deref(), body.as_ref()).ok();
        if provided.as_deref() != Some(expected.as_str()) {
            return Err(SessionError::Unauthorized);
        }
    }

    let options: SessionOptions = decode(body.as_ref())?;
    let created = state.manager.create(options)?;
    Ok(Json(created))
}

/// POST /api/sessions/:id/join - Redeem an invite
async fn join_session(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<JoinedRole>, SessionError> {
    let request: JoinRequest = match parse_body(&body)? {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| SessionError::Validation(format!("Invalid join request: {}", e)))?,
        None => return Err(SessionError::Validation("Missing invite".to_string())),
    };
    let joined = state.manager.join(&session_id, &request.invite)?;
    Ok(Json(joined))
}

/// POST /api/sessions/:id/start (admin)
async fn start_session(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<StatusResponse>, SessionError> {
    let body = parse_body(&body)?;
    let viewer = authorize(&state, &session_id, &headers, &query, body.as_ref())?;
    let status = state.manager.start(&session_id, &viewer)?;
    Ok(Json(StatusResponse { session_id, status }))
}

/// POST /api/sessions/:id/stop (admin)
async fn stop_session(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<StatusResponse>, SessionError> {
    let body = parse_body(&body)?;
    let viewer = authorize(&state, &session_id, &headers, &query, body.as_ref())?;
    let status = state.manager.stop(&session_id, &viewer)?;
    Ok(Json(StatusResponse { session_id, status }))
}

/// PUT /api/sessions/:id/pace (admin)
async fn update_pace(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<Pace>, SessionError> {
    let body = parse_body(&body)?;
    let viewer = authorize(&state, &session_id, &headers, &query, body.as_ref())?;
    let update: PaceUpdate = decode(body.as_ref())?;
    let pace = state.manager.update_pace(&session_id, &viewer, update)?;
    Ok(Json(pace))
}

/// POST /api/sessions/:id/commands (role)
async fn submit_commands(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<SubmitResult>, SessionError> {
    let body = parse_body(&body)?;
    let viewer = authorize(&state, &session_id, &headers, &query, body.as_ref())?;
    let request: CommandsRequest = match body {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| SessionError::Validation(format!("Invalid command batch: {}", e)))?,
        None => return Err(SessionError::Validation("Missing command batch".to_string())),
    };

    let result = state
        .manager
        .submit(&session_id, &viewer, request.commands, request.tick)?;
    Ok(Json(result))
}

/// GET /api/sessions/:id/frame
async fn get_frame(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<SymbolicFrame>, SessionError> {
    let viewer = authorize(&state, &session_id, &headers, &query, None)?;
    Ok(Json(state.manager.frame(&session_id, &viewer)?))
}

/// GET /api/sessions/:id/state
async fn get_state(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<SessionStateView>, SessionError> {
    let viewer = authorize(&state, &session_id, &headers, &query, None)?;
    Ok(Json(state.manager.state(&session_id, &viewer)?))
}

/// GET /api/sessions/:id/tools
async fn get_tools(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Vec<ToolSpec>>, SessionError> {
    let viewer = authorize(&state, &session_id, &headers, &query, None)?;
    Ok(Json(state.manager.tools(&session_id, &viewer)?))
}

/// DELETE /api/sessions/:id (admin)
async fn remove_session(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<StatusCode, SessionError> {
    let viewer = authorize(&state, &session_id, &headers, &query, None)?;
    state.manager.remove(&session_id, &viewer)?;
    Ok(StatusCode::NO_CONTENT)
}
