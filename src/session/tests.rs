use super::*;
use crate::config::{RuntimeConfig, SessionsConfig};
use crate::error::SessionError;
use crate::interpreter::{register_builtins, ActionOutcome, ActionRegistry};
use crate::runtime::{seed_hash, RuntimeCore};
use crate::scene::{LoopMode, SceneError, SceneSpec};
use crate::store::{EventStore, SqliteStore};
use serde_json::json;
use std::sync::{Arc, RwLock};

fn scene_doc(default_loop: &str) -> serde_json::Value {
    json!({
        "templates": { "hero": { "w": 10, "h": 10 } },
        "actors": [{ "uid": "hero_1", "type": "hero", "x": 50, "y": 50 }],
        "rules": [
            { "condition": { "type": "tool", "name": "end_turn" }, "action": "advance_turn" },
            { "condition": { "type": "tool", "name": "wait" }, "action": "noop" }
        ],
        "tools": [
            { "name": "end_turn" },
            { "name": "wait" },
            { "name": "scan", "roles": ["b"] }
        ],
        "cameras": [{ "id": "cam_a", "follow": "hero_1", "width": 30, "height": 30 }],
        "roles": [
            { "id": "a", "kind": "human", "camera": "cam_a", "ui": { "panel": "left" }, "server_fields": { "score": 1 } },
            { "id": "b", "kind": "ai", "required": false, "server_fields": { "score": 2 } }
        ],
        "multiplayer": { "default_loop": default_loop, "tick_rate": 10 }
    })
}

fn registry() -> ActionRegistry {
    let mut reg = ActionRegistry::new();
    register_builtins(&mut reg);
    reg.register_action("noop", |_ctx| Ok(ActionOutcome::Done));
    reg
}

fn game(default_loop: &str) -> Game {
    let scene = SceneSpec::from_json(&scene_doc(default_loop).to_string()).unwrap();
    Game::new(scene, registry()).unwrap()
}

fn session_runtime(mode: LoopMode) -> SessionRuntime {
    let game = game("continuous");
    let roles = game.scene.roles.clone();
    let core = RuntimeCore::new(Arc::clone(&game.scene), &roles, game.registry, seed_hash("queue")).unwrap();
    SessionRuntime::new(core, mode, roles)
}

fn tool(name: &str) -> SessionCommand {
    SessionCommand::Tool {
        name: name.to_string(),
        args: json!({}),
    }
}

fn manager_with(store: Arc<dyn EventStore>, limits: RuntimeConfig) -> SessionManager {
    SessionManager::new(
        game("continuous"),
        store,
        SessionsConfig::default(),
        Arc::new(RwLock::new(limits)),
    )
}

fn manager() -> (SessionManager, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::new(":memory:").unwrap());
    (manager_with(store.clone(), RuntimeConfig::default()), store)
}

fn role(id: &str) -> Viewer {
    Viewer::Role(id.to_string())
}

#[test]
fn test_hybrid_stops_sweep_when_turn_advances() {
    let mut runtime = session_runtime(LoopMode::Hybrid);
    runtime.enqueue("a", vec![tool("end_turn")], 16).unwrap();
    runtime.enqueue("b", vec![tool("wait")], 16).unwrap();

    let report = runtime.tick().unwrap();

    assert_eq!(report.consumed.len(), 1);
    assert_eq!(report.consumed[0].role, "a");
    assert_eq!(runtime.core().world().turn(), 1);
    assert_eq!(runtime.queued("b"), 1);
}

#[test]
fn test_hybrid_sweeps_until_queues_drain() {
    let mut runtime = session_runtime(LoopMode::Hybrid);
    runtime.enqueue("a", vec![tool("wait"), tool("wait")], 16).unwrap();
    runtime.enqueue("b", vec![tool("wait")], 16).unwrap();

    let report = runtime.tick().unwrap();

    let roles: Vec<&str> = report.consumed.iter().map(|c| c.role.as_str()).collect();
    assert_eq!(roles, vec!["a", "b", "a"]);
    assert_eq!(report.ticks.len(), 3);
    assert_eq!(runtime.core().world().turn(), 0);
}

#[test]
fn test_strict_turn_only_consumes_current_role() {
    let mut runtime = session_runtime(LoopMode::StrictTurn);
    assert_eq!(runtime.current_role(), Some("a"));

    runtime.enqueue("b", vec![tool("end_turn")], 16).unwrap();
    let idle = runtime.tick().unwrap();
    assert!(idle.consumed.is_empty());
    assert_eq!(runtime.core().world().turn(), 0);

    runtime
        .enqueue("a", vec![tool("wait"), tool("end_turn"), tool("wait")], 16)
        .unwrap();
    let first = runtime.tick().unwrap();
    assert_eq!(first.consumed.len(), 2);
    assert_eq!(runtime.core().world().turn(), 1);
    assert_eq!(runtime.queued("a"), 1);
    assert_eq!(runtime.current_role(), Some("b"));

    let second = runtime.tick().unwrap();
    assert_eq!(second.consumed[0].role, "b");
    assert_eq!(runtime.core().world().turn(), 2);
}

#[test]
fn test_continuous_keeps_latest_command_per_role() {
    let mut runtime = session_runtime(LoopMode::Continuous);
    assert_eq!(runtime.current_role(), None);
    runtime
        .enqueue("a", vec![tool("end_turn"), tool("end_turn"), tool("wait")], 16)
        .unwrap();
    runtime.enqueue("b", vec![tool("end_turn")], 16).unwrap();

    let report = runtime.tick().unwrap();

    assert_eq!(report.ticks.len(), 1);
    assert_eq!(report.discarded, 2);
    assert_eq!(report.consumed.len(), 2);
    assert_eq!(report.consumed[0].command, tool("wait"));
    assert_eq!(runtime.core().world().turn(), 1);
    assert_eq!(runtime.queued("a"), 0);
}

#[test]
fn test_continuous_tick_without_commands_still_steps() {
    let mut runtime = session_runtime(LoopMode::Continuous);
    let report = runtime.tick().unwrap();
    assert_eq!(report.ticks.len(), 1);
    assert!(report.consumed.is_empty());
}

#[test]
fn test_enqueue_validation_queues_nothing() {
    let mut runtime = session_runtime(LoopMode::StrictTurn);

    let unknown_role = runtime.enqueue("z", vec![tool("wait")], 16);
    assert!(matches!(unknown_role, Err(SessionError::Validation(_))));

    let unknown_tool = runtime.enqueue("a", vec![tool("wait"), tool("fly")], 16);
    assert!(matches!(unknown_tool, Err(SessionError::Validation(_))));

    let not_offered = runtime.enqueue("a", vec![tool("scan")], 16);
    assert!(matches!(not_offered, Err(SessionError::Validation(_))));
    runtime.enqueue("b", vec![tool("scan")], 16).unwrap();

    let full = runtime.enqueue("a", vec![tool("wait"), tool("wait"), tool("wait")], 2);
    assert!(matches!(full, Err(SessionError::Validation(_))));

    assert_eq!(runtime.queued("a"), 0);
}

#[test]
fn test_turn_modes_advance_clock_only_with_queued_commands() {
    let mut runtime = session_runtime(LoopMode::StrictTurn);
    assert!(runtime.advance_clock(5.0).unwrap().ticks.is_empty());

    runtime.enqueue("a", vec![tool("wait")], 16).unwrap();
    assert_eq!(runtime.advance_clock(0.0).unwrap().ticks.len(), 1);
}

#[test]
fn test_create_issues_tokens_and_invites() {
    let (manager, store) = manager();
    let created = manager.create(SessionOptions::default()).unwrap();

    assert_eq!(created.status, SessionStatus::Created);
    assert_eq!(created.loop_mode, LoopMode::Continuous);
    assert_eq!(created.tick_rate, 10);
    assert_eq!(created.seed.len(), 16);
    assert_eq!(created.roles.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(created.invites.len(), 2);
    assert!(store.has(&created.seed).unwrap());

    let id = &created.session_id;
    assert_eq!(manager.authorize(id, &created.admin_token).unwrap(), Viewer::Admin);
    assert_eq!(manager.authorize(id, &created.roles["b"]).unwrap(), role("b"));
    assert!(matches!(manager.authorize(id, "bogus"), Err(SessionError::Unauthorized)));
    assert!(matches!(
        manager.authorize("missing", &created.admin_token),
        Err(SessionError::NotFound(_))
    ));

    let events = store.events(id).unwrap();
    assert_eq!(events[0].event_type, "created");
}

#[test]
fn test_tokens_are_scoped_to_their_session() {
    let (manager, _store) = manager();
    let first = manager.create(SessionOptions::default()).unwrap();
    let second = manager.create(SessionOptions::default()).unwrap();

    let crossed = manager.authorize(&second.session_id, &first.admin_token);
    assert!(matches!(crossed, Err(SessionError::Unauthorized)));

    let invite = &first.invites["a"];
    assert!(matches!(
        manager.join(&second.session_id, invite),
        Err(SessionError::Unauthorized)
    ));
}

#[test]
fn test_explicit_seed_must_be_unique() {
    let (manager, store) = manager();
    let options = SessionOptions {
        seed: Some("alpha".to_string()),
        ..Default::default()
    };
    let created = manager.create(options.clone()).unwrap();
    assert_eq!(created.seed, "alpha");

    let duplicate = manager.create(options);
    assert!(matches!(duplicate, Err(SessionError::Conflict(_))));
    assert_eq!(manager.count(), 1);
    assert_eq!(store.events(&created.session_id).unwrap().len(), 1);

    let empty = manager.create(SessionOptions {
        seed: Some("  ".to_string()),
        ..Default::default()
    });
    assert!(matches!(empty, Err(SessionError::Validation(_))));
}

#[test]
fn test_seed_reserved_in_store_is_rejected() {
    let store = Arc::new(SqliteStore::new(":memory:").unwrap());
    store.reserve("earlier", "beta", &json!({})).unwrap();
    let manager = manager_with(store, RuntimeConfig::default());

    let result = manager.create(SessionOptions {
        seed: Some("beta".to_string()),
        ..Default::default()
    });
    assert!(matches!(result, Err(SessionError::Conflict(_))));
    assert_eq!(manager.count(), 0);
}

#[test]
fn test_create_validates_options() {
    let (manager, _store) = manager();

    let unknown = manager.create(SessionOptions {
        roles: Some(vec!["a".to_string(), "x".to_string()]),
        ..Default::default()
    });
    assert!(matches!(unknown, Err(SessionError::Validation(_))));

    let missing_required = manager.create(SessionOptions {
        roles: Some(vec!["b".to_string()]),
        ..Default::default()
    });
    assert!(matches!(missing_required, Err(SessionError::Validation(_))));

    let bad_pace = manager.create(SessionOptions {
        time_scale: Some(0.0),
        ..Default::default()
    });
    assert!(matches!(bad_pace, Err(SessionError::Validation(_))));

    let solo = manager
        .create(SessionOptions {
            roles: Some(vec!["a".to_string()]),
            loop_mode: Some(LoopMode::StrictTurn),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(solo.roles.len(), 1);
    assert_eq!(solo.loop_mode, LoopMode::StrictTurn);
}

#[test]
fn test_session_limit() {
    let store = Arc::new(SqliteStore::new(":memory:").unwrap());
    let manager = manager_with(
        store,
        RuntimeConfig {
            max_sessions: 1,
            ..Default::default()
        },
    );
    manager.create(SessionOptions::default()).unwrap();
    let over = manager.create(SessionOptions::default());
    assert!(matches!(over, Err(SessionError::Conflict(_))));
}

#[test]
fn test_join_is_idempotent() {
    let (manager, store) = manager();
    let created = manager.create(SessionOptions::default()).unwrap();
    let id = &created.session_id;

    let first = manager.join(id, &created.invites["a"]).unwrap();
    let again = manager.join(id, &created.invites["a"]).unwrap();
    assert_eq!(first, again);
    assert_eq!(first.token, created.roles["a"]);

    let joined: Vec<_> = store
        .events(id)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == "joined")
        .collect();
    assert_eq!(joined.len(), 1);

    let state = manager.state(id, &Viewer::Admin).unwrap();
    let a = state.roles.iter().find(|r| r.id == "a").unwrap();
    assert!(a.joined);
}

#[test]
fn test_state_is_scoped_to_viewer() {
    let (manager, _store) = manager();
    let created = manager.create(SessionOptions::default()).unwrap();
    let id = &created.session_id;

    let admin = manager.state(id, &Viewer::Admin).unwrap();
    assert_eq!(admin.roles.len(), 2);
    assert!(admin.self_role.is_none());
    assert!(admin.camera.is_none());
    assert!(admin.ui.is_none());
    assert_eq!(admin.world.world.roles.len(), 2);

    let a = manager.state(id, &role("a")).unwrap();
    assert_eq!(a.roles.len(), 1);
    assert_eq!(a.roles[0].id, "a");
    assert_eq!(a.self_role.as_deref(), Some("a"));
    assert_eq!(a.camera.as_ref().map(|c| c.id.as_str()), Some("cam_a"));
    assert_eq!(a.ui, Some(json!({ "panel": "left" })));
    assert_eq!(a.world.world.roles.keys().collect::<Vec<_>>(), vec!["a"]);

    let value = serde_json::to_value(&a).unwrap();
    assert_eq!(value["self"], "a");
    let admin_value = serde_json::to_value(&admin).unwrap();
    assert!(admin_value.get("self").is_none());
}

#[test]
fn test_frames_per_viewer() {
    let (manager, _store) = manager();
    let created = manager.create(SessionOptions::default()).unwrap();
    let id = &created.session_id;

    let ai = manager.frame(id, &role("b")).unwrap();
    assert!(ai.rows.is_empty());
    assert!(ai.legend.is_empty());

    let human = manager.frame(id, &role("a")).unwrap();
    assert!(!human.rows.is_empty());
    let admin = manager.frame(id, &Viewer::Admin).unwrap();
    assert_eq!(admin.rows, vec!["h"]);
}

#[test]
fn test_submit_and_tick_records_event() {
    let (manager, store) = manager();
    let created = manager.create(SessionOptions::default()).unwrap();
    let id = &created.session_id;

    let result = manager
        .submit(id, &role("a"), vec![tool("end_turn")], true)
        .unwrap();
    assert_eq!(result.state.tick, 1);
    assert_eq!(result.state.turn, 1);

    let ticks: Vec<_> = store
        .events(id)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == "tick")
        .collect();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].tick, Some(1));
    assert_eq!(ticks[0].payload["consumed"][0]["role"], "a");

    let queued_only = manager.submit(id, &role("b"), vec![tool("scan")], false).unwrap();
    assert_eq!(queued_only.state.tick, 1);
    assert_eq!(queued_only.state.roles[0].queued, 1);
}

#[test]
fn test_submit_rejections() {
    let store = Arc::new(SqliteStore::new(":memory:").unwrap());
    let manager = Arc::new(manager_with(
        store,
        RuntimeConfig {
            max_commands_per_request: 1,
            ..Default::default()
        },
    ));
    let created = manager.create(SessionOptions::default()).unwrap();
    let id = &created.session_id;

    let admin = manager.submit(id, &Viewer::Admin, vec![tool("wait")], false);
    assert!(matches!(admin, Err(SessionError::Unauthorized)));

    let too_many = manager.submit(id, &role("a"), vec![tool("wait"), tool("wait")], false);
    assert!(matches!(too_many, Err(SessionError::Validation(_))));

    manager.stop(id, &Viewer::Admin).unwrap();
    let stopped = manager.submit(id, &role("a"), vec![tool("wait")], false);
    assert!(matches!(stopped, Err(SessionError::Validation(_))));
}

#[test]
fn test_lifecycle_and_clock() {
    let (manager, store) = manager();
    let manager = Arc::new(manager);
    let created = manager.create(SessionOptions::default()).unwrap();
    let id = &created.session_id;

    assert!(manager.advance_clock(id, 1.0).unwrap().ticks.is_empty());
    assert!(matches!(manager.start(id, &role("a")), Err(SessionError::Unauthorized)));

    assert_eq!(manager.start(id, &Viewer::Admin).unwrap(), SessionStatus::Running);
    let report = manager.advance_clock(id, 0.25).unwrap();
    assert_eq!(report.ticks.len(), 2);

    assert_eq!(manager.stop(id, &Viewer::Admin).unwrap(), SessionStatus::Stopped);
    assert!(manager.advance_clock(id, 1.0).unwrap().ticks.is_empty());

    let types: Vec<String> = store
        .events(id)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, vec!["created", "started", "tick", "stopped"]);
}

#[test]
fn test_game_rejects_structurally_invalid_scene() {
    let mut scene = SceneSpec::from_json(&scene_doc("continuous").to_string()).unwrap();
    let twin = scene.actors[0].clone();
    scene.actors.push(twin);

    let result = Game::new(scene, registry());
    assert!(matches!(result, Err(SceneError::DuplicateUid(uid)) if uid == "hero_1"));
}

#[test]
fn test_empty_tick_pass_is_recorded() {
    let (manager, store) = manager();
    let created = manager
        .create(SessionOptions {
            loop_mode: Some(LoopMode::StrictTurn),
            ..Default::default()
        })
        .unwrap();
    let id = &created.session_id;

    let report = manager.tick(id, &Viewer::Admin).unwrap();
    assert!(report.ticks.is_empty());

    let ticks: Vec<_> = store
        .events(id)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == "tick")
        .collect();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].tick, None);
    assert_eq!(ticks[0].payload["ticks"], json!([]));
    assert_eq!(ticks[0].payload["consumed"], json!([]));
}

#[test]
fn test_update_pace() {
    let (manager, _store) = manager();
    let created = manager.create(SessionOptions::default()).unwrap();
    let id = &created.session_id;

    let pace = manager
        .update_pace(
            id,
            &Viewer::Admin,
            PaceUpdate {
                time_scale: Some(2.0),
                max_catchup_steps: None,
            },
        )
        .unwrap();
    assert_eq!(pace.time_scale, 2.0);
    assert_eq!(pace.max_catchup_steps, 5);

    let zero = manager.update_pace(
        id,
        &Viewer::Admin,
        PaceUpdate {
            time_scale: None,
            max_catchup_steps: Some(0),
        },
    );
    assert!(matches!(zero, Err(SessionError::Validation(_))));

    let by_role = manager.update_pace(id, &role("a"), PaceUpdate::default());
    assert!(matches!(by_role, Err(SessionError::Unauthorized)));
}

#[test]
fn test_tools_filtered_by_role() {
    let (manager, _store) = manager();
    let created = manager.create(SessionOptions::default()).unwrap();
    let id = &created.session_id;

    let names = |viewer: &Viewer| -> Vec<String> {
        manager
            .tools(id, viewer)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    };
    assert_eq!(names(&role("a")), vec!["end_turn", "wait"]);
    assert_eq!(names(&role("b")), vec!["end_turn", "wait", "scan"]);
    assert_eq!(names(&Viewer::Admin).len(), 3);
}

#[test]
fn test_remove_revokes_tokens() {
    let (manager, _store) = manager();
    let created = manager.create(SessionOptions::default()).unwrap();
    let id = &created.session_id;

    manager.remove(id, &Viewer::Admin).unwrap();
    assert_eq!(manager.count(), 0);
    assert!(matches!(
        manager.authorize(id, &created.admin_token),
        Err(SessionError::NotFound(_))
    ));
}

#[test]
fn test_same_seed_same_commands_same_state() {
    let run = || {
        let (manager, _store) = manager();
        let created = manager
            .create(SessionOptions {
                seed: Some("replay".to_string()),
                ..Default::default()
            })
            .unwrap();
        let id = created.session_id.clone();
        for _ in 0..3 {
            manager.submit(&id, &role("a"), vec![tool("end_turn")], true).unwrap();
        }
        manager.submit(&id, &role("b"), vec![tool("wait")], true).unwrap();
        let state = manager.state(&id, &Viewer::Admin).unwrap();
        serde_json::to_string(&state.world).unwrap()
    };
    assert_eq!(run(), run());
}
