// HTTP and WebSocket APIs

pub mod admin;
pub mod sessions;
pub mod stream;

pub use admin::{create_admin_router, AdminAppState};
pub use sessions::{create_session_router, SessionAppState};
pub use stream::{create_stream_router, stream_period};

use crate::error::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Error response
#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SessionError::Validation(_) => StatusCode::BAD_REQUEST,
            SessionError::Unauthorized => StatusCode::UNAUTHORIZED,
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Conflict(_) => StatusCode::CONFLICT,
            SessionError::Internal(e) => {
                error!(error = %e, "Internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Complete HTTP surface: session API, state stream and runtime config
pub fn create_app(sessions: SessionAppState, admin: AdminAppState) -> Router {
    let sessions = Arc::new(sessions);
    Router::new()
        .merge(create_session_router(Arc::clone(&sessions)))
        .merge(create_stream_router(sessions))
        .merge(create_admin_router(admin))
        .layer(CorsLayer::permissive())
}
