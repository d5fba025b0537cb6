use super::sessions::{SessionAppState, TokenQuery};
use crate::auth::resolve_token;
use crate::error::SessionError;
use crate::session::Viewer;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, Request, State,
    },
    http::HeaderMap,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Snapshot period: one tick, but never faster than `min_interval_ms`
pub fn stream_period(tick_rate: u32, min_interval_ms: u64) -> Duration {
    let tick_ms = 1000 / tick_rate.max(1) as u64;
    Duration::from_millis(tick_ms.max(min_interval_ms).max(1))
}

/// Auth middleware: resolves the token before the WebSocket upgrade so a
/// rejected client gets a plain 401/404.
async fn stream_auth(
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<TokenQuery>,
    headers: HeaderMap,
    mut req: Request,
    next: Next,
) -> Response {
    let viewer = resolve_token(&headers, params.token.as_deref(), None)
        .map_err(|_| SessionError::Unauthorized)
        .and_then(|token| state.manager.authorize(&session_id, &token));

    match viewer {
        Ok(viewer) => {
            req.extensions_mut().insert(viewer);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// GET /api/sessions/:id/stream - State stream upgrade (auth handled by stream_auth)
async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SessionAppState>>,
    Path(session_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Response {
    info!(session_id = %session_id, viewer = ?viewer, "State stream upgrade request received");
    ws.on_upgrade(move |socket| stream_state(socket, state, session_id, viewer))
}

pub fn create_stream_router(state: Arc<SessionAppState>) -> Router {
    Router::new()
        .route("/api/sessions/:id/stream", get(stream_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), stream_auth))
        .with_state(state)
}

/// Push viewer-scoped snapshots until the client leaves, the session is
/// removed or a send fails
async fn stream_state(mut socket: WebSocket, state: Arc<SessionAppState>, session_id: String, viewer: Viewer) {
    let tick_rate = state.manager.scene().multiplayer.tick_rate;
    let period = stream_period(tick_rate, state.manager.config().stream_min_interval_ms);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(session_id = %session_id, period_ms = period.as_millis() as u64, "State stream opened");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session_id, "Stream client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!(session_id = %session_id, error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Streams are server-to-client only
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "Stream socket error");
                        break;
                    }
                }
            }

            _ = interval.tick() => {
                let view = match state.manager.state(&session_id, &viewer) {
                    Ok(view) => view,
                    Err(SessionError::NotFound(_)) => {
                        info!(session_id = %session_id, "Session removed, closing stream");
                        break;
                    }
                    Err(e) => {
                        error!(session_id = %session_id, error = %e, "Failed to project session state");
                        break;
                    }
                };
                let text = match serde_json::to_string(&view) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(session_id = %session_id, error = %e, "Failed to encode session state");
                        break;
                    }
                };
                if let Err(e) = socket.send(Message::Text(text)).await {
                    warn!(session_id = %session_id, error = %e, "Stream send failed, closing");
                    break;
                }
            }
        }
    }

    info!(session_id = %session_id, "State stream closed");
}
