use super::command::SessionCommand;
use super::runtime::{ScheduleReport, SessionRuntime};
use super::view::{project, SessionStateView, ViewSource, Viewer};
use crate::config::{RuntimeConfig, SessionsConfig, SharedRuntimeConfig};
use crate::error::SessionError;
use crate::interpreter::{ActionRegistry, World};
use crate::runtime::{seed_hash, Pace, RuntimeCore};
use crate::scene::{validate_scene, LoopMode, RoleSpec, SceneError, SceneSpec, ToolSpec};
use crate::store::EventStore;
use crate::symbolic::{SymbolicFrame, SymbolicRenderer};
use anyhow::anyhow;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A validated scene together with the functions its rules call
#[derive(Clone)]
pub struct Game {
    pub scene: Arc<SceneSpec>,
    pub registry: Arc<ActionRegistry>,
}

impl Game {
    /// Fails if the scene is structurally invalid, a rule names an
    /// unregistered function or the declared roles cannot be instantiated
    pub fn new(scene: SceneSpec, registry: ActionRegistry) -> Result<Self, SceneError> {
        validate_scene(&scene)?;
        registry.validate_scene(&scene)?;
        let scene = Arc::new(scene);
        World::new(Arc::clone(&scene), &scene.roles)?;
        Ok(Self {
            scene,
            registry: Arc::new(registry),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Created,
    Running,
    Stopped,
}

/// Options for `POST /api/sessions`; everything defaults from the scene
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub seed: Option<String>,
    /// Participating role ids (all declared roles when absent)
    pub roles: Option<Vec<String>>,
    pub loop_mode: Option<LoopMode>,
    pub time_scale: Option<f64>,
    pub max_catchup_steps: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaceUpdate {
    pub time_scale: Option<f64>,
    pub max_catchup_steps: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreatedSession {
    pub session_id: String,
    pub seed: String,
    pub status: SessionStatus,
    pub admin_token: String,
    pub loop_mode: LoopMode,
    pub tick_rate: u32,
    /// role id -> access token
    pub roles: BTreeMap<String, String>,
    /// role id -> invite token
    pub invites: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JoinedRole {
    pub role: String,
    pub token: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubmitResult {
    pub frame: SymbolicFrame,
    pub state: SessionStateView,
}

/// What a bearer token grants
#[derive(Clone, Debug)]
struct Grant {
    session_id: String,
    viewer: Viewer,
}

struct SessionInner {
    status: SessionStatus,
    runtime: SessionRuntime,
    joined: HashSet<String>,
}

struct Session {
    id: String,
    seed: String,
    admin_token: String,
    role_tokens: BTreeMap<String, String>,
    invites: BTreeMap<String, String>,
    inner: Mutex<SessionInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    fn lock(&self) -> Result<MutexGuard<'_, SessionInner>, SessionError> {
        self.inner
            .lock()
            .map_err(|_| SessionError::Internal(anyhow!("Session {} lock poisoned", self.id)))
    }

    fn stop_driver(&self) {
        if let Ok(mut driver) = self.driver.lock() {
            if let Some(task) = driver.take() {
                task.abort();
            }
        }
    }

    fn view(&self, inner: &SessionInner, viewer: &Viewer) -> SessionStateView {
        project(
            ViewSource {
                session_id: &self.id,
                seed: &self.seed,
                status: inner.status,
                joined: &inner.joined,
                runtime: &inner.runtime,
            },
            viewer,
        )
    }
}

/// Process-wide session registry
pub struct SessionManager {
    game: Game,
    sessions: DashMap<String, Arc<Session>>,
    /// token -> grant, for admin and role tokens alike
    tokens: DashMap<String, Grant>,
    /// invite token -> (session id, role id)
    invites: DashMap<String, (String, String)>,
    /// Seeds reserved by this process
    seeds: Mutex<HashSet<String>>,
    store: Arc<dyn EventStore>,
    config: SessionsConfig,
    runtime_config: SharedRuntimeConfig,
}

impl SessionManager {
    pub fn new(
        game: Game,
        store: Arc<dyn EventStore>,
        config: SessionsConfig,
        runtime_config: SharedRuntimeConfig,
    ) -> Self {
        Self {
            game,
            sessions: DashMap::new(),
            tokens: DashMap::new(),
            invites: DashMap::new(),
            seeds: Mutex::new(HashSet::new()),
            store,
            config,
            runtime_config,
        }
    }

    pub fn scene(&self) -> &Arc<SceneSpec> {
        &self.game.scene
    }

    pub fn config(&self) -> &SessionsConfig {
        &self.config
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    fn limits(&self) -> RuntimeConfig {
        self.runtime_config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn session(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Create a session: resolve and reserve its seed, build its runtime and
    /// issue tokens. Nothing is registered if any step fails.
    pub fn create(&self, options: SessionOptions) -> Result<CreatedSession, SessionError> {
        let limits = self.limits();
        if self.sessions.len() >= limits.max_sessions {
            return Err(SessionError::Conflict(format!(
                "Session limit reached ({} max)",
                limits.max_sessions
            )));
        }

        let scene = Arc::clone(&self.game.scene);
        let roles = select_roles(&scene, options.roles.as_deref())?;
        let loop_mode = options.loop_mode.unwrap_or(scene.multiplayer.default_loop);
        let mut pace = Pace::from_scene(&scene);
        apply_pace(
            &mut pace,
            &PaceUpdate {
                time_scale: options.time_scale,
                max_catchup_steps: options.max_catchup_steps,
            },
        )?;

        let session_id = Uuid::now_v7().to_string();
        if self.sessions.contains_key(&session_id) {
            return Err(SessionError::Conflict(format!("Session '{}' already exists", session_id)));
        }

        let metadata = json!({
            "loop_mode": loop_mode,
            "roles": roles.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        });
        let seed = self.resolve_seed(&session_id, options.seed, &metadata)?;

        let mut core = RuntimeCore::new(
            Arc::clone(&scene),
            &roles,
            Arc::clone(&self.game.registry),
            seed_hash(&seed),
        )?;
        core.set_pace(pace);

        let admin_token = Uuid::new_v4().to_string();
        let role_tokens: BTreeMap<String, String> = roles
            .iter()
            .map(|r| (r.id.clone(), Uuid::new_v4().to_string()))
            .collect();
        let invites: BTreeMap<String, String> = roles
            .iter()
            .map(|r| (r.id.clone(), Uuid::new_v4().to_string()))
            .collect();

        let session = Arc::new(Session {
            id: session_id.clone(),
            seed: seed.clone(),
            admin_token: admin_token.clone(),
            role_tokens: role_tokens.clone(),
            invites: invites.clone(),
            inner: Mutex::new(SessionInner {
                status: SessionStatus::Created,
                runtime: SessionRuntime::new(core, loop_mode, roles),
                joined: HashSet::new(),
            }),
            driver: Mutex::new(None),
        });

        match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(_) => {
                return Err(SessionError::Conflict(format!(
                    "Session '{}' already exists",
                    session_id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }

        self.tokens.insert(
            admin_token.clone(),
            Grant {
                session_id: session_id.clone(),
                viewer: Viewer::Admin,
            },
        );
        for (role, token) in &role_tokens {
            self.tokens.insert(
                token.clone(),
                Grant {
                    session_id: session_id.clone(),
                    viewer: Viewer::Role(role.clone()),
                },
            );
        }
        for (role, invite) in &invites {
            self.invites
                .insert(invite.clone(), (session_id.clone(), role.clone()));
        }

        self.record(&session_id, "created", &json!({ "seed": seed, "metadata": metadata }), None)?;
        info!(session_id = %session_id, seed = %seed, loop_mode = %loop_mode, "Session created");

        Ok(CreatedSession {
            session_id,
            seed,
            status: SessionStatus::Created,
            admin_token,
            loop_mode,
            tick_rate: scene.multiplayer.tick_rate,
            roles: role_tokens,
            invites,
        })
    }

    /// Reserve the requested seed, or generate random ones until one sticks
    fn resolve_seed(
        &self,
        session_id: &str,
        requested: Option<String>,
        metadata: &Value,
    ) -> Result<String, SessionError> {
        if let Some(seed) = requested {
            if seed.trim().is_empty() {
                return Err(SessionError::Validation("Seed must not be empty".to_string()));
            }
            self.reserve_seed(session_id, &seed, metadata)?;
            return Ok(seed);
        }

        for attempt in 1..=self.config.max_seed_attempts {
            let seed = generate_seed();
            match self.reserve_seed(session_id, &seed, metadata) {
                Ok(()) => return Ok(seed),
                Err(SessionError::Conflict(_)) => {
                    debug!(attempt, "Generated seed already reserved, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(SessionError::Conflict(format!(
            "Could not reserve a unique seed after {} attempts",
            self.config.max_seed_attempts
        )))
    }

    fn reserve_seed(&self, session_id: &str, seed: &str, metadata: &Value) -> Result<(), SessionError> {
        let mut reserved = self
            .seeds
            .lock()
            .map_err(|_| SessionError::Internal(anyhow!("Seed set lock poisoned")))?;
        if reserved.contains(seed) || self.store.has(seed)? {
            return Err(SessionError::Conflict(format!("Seed '{}' is already reserved", seed)));
        }
        self.store.reserve(session_id, seed, metadata)?;
        reserved.insert(seed.to_string());
        Ok(())
    }

    /// Redeem an invite. Repeated redemption yields the same access token.
    pub fn join(&self, session_id: &str, invite: &str) -> Result<JoinedRole, SessionError> {
        let session = self.session(session_id)?;
        let role = self
            .invites
            .get(invite)
            .filter(|entry| entry.value().0 == session_id)
            .map(|entry| entry.value().1.clone())
            .ok_or(SessionError::Unauthorized)?;
        let token = session
            .role_tokens
            .get(&role)
            .cloned()
            .ok_or(SessionError::Unauthorized)?;

        let newly_joined = session.lock()?.joined.insert(role.clone());
        if newly_joined {
            self.record(session_id, "joined", &json!({ "role": role }), None)?;
            info!(session_id = %session_id, role = %role, "Role joined");
        }
        Ok(JoinedRole { role, token })
    }

    /// Resolve a bearer token to a viewer of `session_id`
    pub fn authorize(&self, session_id: &str, token: &str) -> Result<Viewer, SessionError> {
        self.session(session_id)?;
        let grant = self.tokens.get(token).ok_or(SessionError::Unauthorized)?;
        if grant.session_id != session_id {
            return Err(SessionError::Unauthorized);
        }
        Ok(grant.viewer.clone())
    }

    /// Mark the session running and, when a tokio runtime is available,
    /// spawn its background clock
    pub fn start(self: &Arc<Self>, session_id: &str, viewer: &Viewer) -> Result<SessionStatus, SessionError> {
        require_admin(viewer)?;
        let session = self.session(session_id)?;
        {
            let mut inner = session.lock()?;
            if inner.status == SessionStatus::Running {
                return Ok(inner.status);
            }
            inner.status = SessionStatus::Running;
        }
        if self.config.driver_enabled {
            self.spawn_driver(&session);
        }
        self.record(session_id, "started", &json!({}), None)?;
        info!(session_id = %session_id, "Session started");
        Ok(SessionStatus::Running)
    }

    fn spawn_driver(self: &Arc<Self>, session: &Arc<Session>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(session_id = %session.id, "No async runtime, session clock not started");
            return;
        };
        let tick_rate = self.game.scene.multiplayer.tick_rate.max(1);
        let period = Duration::from_millis((1000 / tick_rate as u64).max(1));
        let manager: Weak<SessionManager> = Arc::downgrade(self);
        let session_id = session.id.clone();

        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last = Instant::now();
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let now = Instant::now();
                let elapsed = now.duration_since(last).as_secs_f64();
                last = now;
                match manager.advance_clock(&session_id, elapsed) {
                    Ok(_) => {}
                    Err(SessionError::NotFound(_)) => break,
                    Err(e) => error!(session_id = %session_id, error = %e, "Session clock tick failed"),
                }
            }
        });

        if let Ok(mut driver) = session.driver.lock() {
            if let Some(previous) = driver.replace(task) {
                previous.abort();
            }
        }
    }

    pub fn stop(&self, session_id: &str, viewer: &Viewer) -> Result<SessionStatus, SessionError> {
        require_admin(viewer)?;
        let session = self.session(session_id)?;
        session.lock()?.status = SessionStatus::Stopped;
        session.stop_driver();
        self.record(session_id, "stopped", &json!({}), None)?;
        info!(session_id = %session_id, "Session stopped");
        Ok(SessionStatus::Stopped)
    }

    pub fn update_pace(&self, session_id: &str, viewer: &Viewer, update: PaceUpdate) -> Result<Pace, SessionError> {
        require_admin(viewer)?;
        let session = self.session(session_id)?;
        let pace = {
            let mut inner = session.lock()?;
            let mut pace = inner.runtime.core().pace();
            apply_pace(&mut pace, &update)?;
            inner.runtime.core_mut().set_pace(pace);
            pace
        };
        self.record(session_id, "pace", &json!(pace), None)?;
        info!(
            session_id = %session_id,
            time_scale = pace.time_scale,
            max_catchup_steps = pace.max_catchup_steps,
            "Session pace updated"
        );
        Ok(pace)
    }

    /// Queue a batch of commands for the viewer's role and optionally run
    /// one scheduling pass right away
    pub fn submit(
        &self,
        session_id: &str,
        viewer: &Viewer,
        commands: Vec<SessionCommand>,
        tick: bool,
    ) -> Result<SubmitResult, SessionError> {
        let Viewer::Role(role) = viewer else {
            return Err(SessionError::Unauthorized);
        };
        let limits = self.limits();
        if commands.len() > limits.max_commands_per_request {
            return Err(SessionError::Validation(format!(
                "Too many commands ({} max per request)",
                limits.max_commands_per_request
            )));
        }

        let session = self.session(session_id)?;
        let mut inner = session.lock()?;
        if inner.status == SessionStatus::Stopped {
            return Err(SessionError::Validation(format!(
                "Session '{}' is stopped",
                session_id
            )));
        }
        inner
            .runtime
            .enqueue(role, commands, limits.max_queue_per_role)?;

        if tick {
            let report = inner.runtime.tick()?;
            self.record_schedule(&session.id, &inner, &report)?;
        }

        Ok(SubmitResult {
            frame: render_frame(&inner, viewer),
            state: session.view(&inner, viewer),
        })
    }

    /// Feed wall-clock time to a running session
    pub fn advance_clock(&self, session_id: &str, elapsed_secs: f64) -> Result<ScheduleReport, SessionError> {
        let session = self.session(session_id)?;
        let mut inner = session.lock()?;
        if inner.status != SessionStatus::Running {
            return Ok(ScheduleReport::default());
        }
        let report = inner.runtime.advance_clock(elapsed_secs)?;
        if !report.ticks.is_empty() {
            self.record_schedule(&session.id, &inner, &report)?;
        }
        Ok(report)
    }

    /// Run one scheduling pass regardless of the clock
    pub fn tick(&self, session_id: &str, viewer: &Viewer) -> Result<ScheduleReport, SessionError> {
        require_admin(viewer)?;
        let session = self.session(session_id)?;
        let mut inner = session.lock()?;
        let report = inner.runtime.tick()?;
        self.record_schedule(&session.id, &inner, &report)?;
        Ok(report)
    }

    /// Append one `tick` event for a scheduling pass. A pass that ran no
    /// tick is keyed by no tick number and carries empty lists.
    fn record_schedule(
        &self,
        session_id: &str,
        inner: &SessionInner,
        report: &ScheduleReport,
    ) -> Result<(), SessionError> {
        let payload = json!({
            "ticks": report.ticks.iter().map(|t| t.tick).collect::<Vec<_>>(),
            "turn": inner.runtime.core().world().turn(),
            "consumed": report.consumed,
            "discarded": report.discarded,
            "removed": report
                .ticks
                .iter()
                .flat_map(|t| t.removed.iter().map(|a| a.uid.as_str()))
                .collect::<Vec<_>>(),
        });
        let last = report.ticks.last().map(|t| t.tick);
        self.record(session_id, "tick", &payload, last)
    }

    fn record(&self, session_id: &str, event_type: &str, payload: &Value, tick: Option<u64>) -> Result<(), SessionError> {
        self.store
            .append_event(session_id, event_type, payload, tick)
            .map(|_| ())
            .map_err(SessionError::from)
    }

    pub fn state(&self, session_id: &str, viewer: &Viewer) -> Result<SessionStateView, SessionError> {
        let session = self.session(session_id)?;
        let inner = session.lock()?;
        Ok(session.view(&inner, viewer))
    }

    pub fn frame(&self, session_id: &str, viewer: &Viewer) -> Result<SymbolicFrame, SessionError> {
        let session = self.session(session_id)?;
        let inner = session.lock()?;
        Ok(render_frame(&inner, viewer))
    }

    /// Tools offered to the viewer (every tool for admins)
    pub fn tools(&self, session_id: &str, viewer: &Viewer) -> Result<Vec<ToolSpec>, SessionError> {
        self.session(session_id)?;
        Ok(self
            .game
            .scene
            .tools
            .iter()
            .filter(|t| viewer.role().map_or(true, |role| t.offered_to(role)))
            .cloned()
            .collect())
    }

    /// Drop a session and revoke its tokens. Its seed stays reserved.
    pub fn remove(&self, session_id: &str, viewer: &Viewer) -> Result<(), SessionError> {
        require_admin(viewer)?;
        let (_, session) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.stop_driver();
        self.tokens.remove(&session.admin_token);
        for token in session.role_tokens.values() {
            self.tokens.remove(token);
        }
        for invite in session.invites.values() {
            self.invites.remove(invite);
        }
        info!(session_id = %session_id, "Session removed");
        Ok(())
    }
}

fn require_admin(viewer: &Viewer) -> Result<(), SessionError> {
    match viewer {
        Viewer::Admin => Ok(()),
        Viewer::Role(_) => Err(SessionError::Unauthorized),
    }
}

fn render_frame(inner: &SessionInner, viewer: &Viewer) -> SymbolicFrame {
    let world = inner.runtime.core().world();
    let scene = world.scene();
    let renderer = SymbolicRenderer::new(scene, world);
    match viewer.role().and_then(|id| scene.role(id)) {
        Some(role) => renderer.render_for_role(role),
        None => renderer.render(None),
    }
}

/// Participating roles in declaration order. Required roles cannot be left out.
fn select_roles(scene: &SceneSpec, requested: Option<&[String]>) -> Result<Vec<RoleSpec>, SessionError> {
    let Some(requested) = requested else {
        return Ok(scene.roles.clone());
    };
    for id in requested {
        if scene.role(id).is_none() {
            return Err(SessionError::Validation(format!("Unknown role '{}'", id)));
        }
    }
    if let Some(missing) = scene
        .roles
        .iter()
        .find(|r| r.required && !requested.contains(&r.id))
    {
        return Err(SessionError::Validation(format!(
            "Required role '{}' is missing",
            missing.id
        )));
    }
    Ok(scene
        .roles
        .iter()
        .filter(|r| requested.contains(&r.id))
        .cloned()
        .collect())
}

fn apply_pace(pace: &mut Pace, update: &PaceUpdate) -> Result<(), SessionError> {
    if let Some(scale) = update.time_scale {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(SessionError::Validation(
                "time_scale must be a positive number".to_string(),
            ));
        }
        pace.time_scale = scale;
    }
    if let Some(steps) = update.max_catchup_steps {
        if steps == 0 {
            return Err(SessionError::Validation(
                "max_catchup_steps must be positive".to_string(),
            ));
        }
        pace.max_catchup_steps = steps;
    }
    Ok(())
}

/// Random seed: 16 lowercase alphanumeric characters
fn generate_seed() -> String {
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| {
            let idx = rng.gen_range(0..36u8);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}
