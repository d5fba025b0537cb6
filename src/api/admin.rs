use super::ErrorResponse;
use crate::config::SharedRuntimeConfig;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// State for the admin API.
#[derive(Clone)]
pub struct AdminAppState {
    pub runtime_config: SharedRuntimeConfig,
    /// Required bearer token for PUT /api/admin/config. None = PUT disabled.
    pub admin_token: Option<String>,
}

/// Partial update body; only fields present in the request are changed.
#[derive(Deserialize)]
pub struct RuntimeConfigUpdate {
    pub max_sessions: Option<usize>,
    pub max_commands_per_request: Option<usize>,
    pub max_queue_per_role: Option<usize>,
}

pub fn create_admin_router(state: AdminAppState) -> Router {
    Router::new()
        .route("/api/admin/config", get(get_config).put(put_config))
        .with_state(Arc::new(state))
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// GET /api/admin/config - returns current RuntimeConfig.
async fn get_config(State(state): State<Arc<AdminAppState>>) -> Response {
    let cfg = state
        .runtime_config
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    Json(cfg).into_response()
}

/// PUT /api/admin/config - partial update. Requires the server admin token.
async fn put_config(
    State(state): State<Arc<AdminAppState>>,
    headers: HeaderMap,
    Json(update): Json<RuntimeConfigUpdate>,
) -> Response {
    if !validate_admin_token(&headers, &state.admin_token) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let limits = [
        update.max_sessions,
        update.max_commands_per_request,
        update.max_queue_per_role,
    ];
    if limits.iter().any(|v| *v == Some(0)) {
        return error(StatusCode::BAD_REQUEST, "Limits must be positive");
    }

    let mut cfg = state
        .runtime_config
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(v) = update.max_sessions {
        cfg.max_sessions = v;
    }
    if let Some(v) = update.max_commands_per_request {
        cfg.max_commands_per_request = v;
    }
    if let Some(v) = update.max_queue_per_role {
        cfg.max_queue_per_role = v;
    }

    info!(
        max_sessions = cfg.max_sessions,
        max_commands_per_request = cfg.max_commands_per_request,
        max_queue_per_role = cfg.max_queue_per_role,
        "Runtime config updated"
    );
    Json(cfg.clone()).into_response()
}

/// Returns true if the bearer token in `Authorization` matches the expected admin token.
/// Returns false when no admin token is configured.
fn validate_admin_token(headers: &HeaderMap, expected: &Option<String>) -> bool {
    let Some(expected_token) = expected else {
        return false;
    };

    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected_token)
}
