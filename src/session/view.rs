use super::runtime::SessionRuntime;
use crate::runtime::{Pace, RuntimeSnapshot};
use crate::scene::{CameraSpec, Fields, LoopMode, RoleKind};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Who is looking at a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Viewer {
    Admin,
    Role(String),
}

impl Viewer {
    pub fn role(&self) -> Option<&str> {
        match self {
            Viewer::Admin => None,
            Viewer::Role(id) => Some(id),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RoleView {
    pub id: String,
    pub kind: RoleKind,
    pub required: bool,
    pub joined: bool,
    pub queued: usize,
    pub server_fields: Fields,
}

/// Viewer-scoped session state
#[derive(Clone, Debug, Serialize)]
pub struct SessionStateView {
    pub session_id: String,
    pub seed: String,
    pub status: super::SessionStatus,
    pub loop_mode: LoopMode,
    pub tick_rate: u32,
    pub tick: u64,
    pub turn: u64,
    pub current_role: Option<String>,
    pub pace: Pace,
    pub turn_timeout_ms: Option<u64>,
    pub hybrid_window_ms: Option<u64>,
    pub roles: Vec<RoleView>,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui: Option<Value>,
    pub world: RuntimeSnapshot,
}

pub(crate) struct ViewSource<'a> {
    pub session_id: &'a str,
    pub seed: &'a str,
    pub status: super::SessionStatus,
    pub joined: &'a HashSet<String>,
    pub runtime: &'a SessionRuntime,
}

/// Project session state for `viewer`. A role sees only its own role record,
/// its camera and its UI fragment; admins get the neutral view.
pub(crate) fn project(source: ViewSource<'_>, viewer: &Viewer) -> SessionStateView {
    let runtime = source.runtime;
    let core = runtime.core();
    let scene = core.world().scene();
    let world = core.world();
    let own = viewer.role();

    let roles = runtime
        .roles()
        .filter(|r| own.map_or(true, |id| id == r.id))
        .map(|r| RoleView {
            id: r.id.clone(),
            kind: r.kind,
            required: r.required,
            joined: source.joined.contains(&r.id),
            queued: runtime.queued(&r.id),
            server_fields: world.role_fields(&r.id).cloned().unwrap_or_default(),
        })
        .collect();

    let mut snapshot = core.snapshot();
    if let Some(id) = own {
        snapshot.world.roles.retain(|role, _| role == id);
    }

    let role_spec = own.and_then(|id| scene.role(id));
    SessionStateView {
        session_id: source.session_id.to_string(),
        seed: source.seed.to_string(),
        status: source.status,
        loop_mode: runtime.mode(),
        tick_rate: scene.multiplayer.tick_rate,
        tick: world.tick(),
        turn: world.turn(),
        current_role: runtime.current_role().map(str::to_string),
        pace: core.pace(),
        turn_timeout_ms: scene.multiplayer.turn_timeout_ms,
        hybrid_window_ms: scene.multiplayer.hybrid_window_ms,
        roles,
        self_role: own.map(str::to_string),
        camera: role_spec
            .and_then(|r| r.camera.as_deref())
            .and_then(|id| scene.camera(id))
            .cloned(),
        ui: role_spec.and_then(|r| r.ui.clone()),
        world: snapshot,
    }
}
