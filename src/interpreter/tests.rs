use super::*;
use crate::scene::{CollisionKind, FieldValue, Phase};
use serde_json::json;

fn scene(rules: serde_json::Value, actors: serde_json::Value) -> Arc<SceneSpec> {
    let doc = json!({
        "templates": {
            "player": { "w": 10, "h": 10 },
            "coin": { "w": 4, "h": 4 },
            "hat": { "w": 4, "h": 4 }
        },
        "globals": [ { "name": "log", "value": "" }, { "name": "count", "value": 0 } ],
        "tools": [ { "name": "jump" } ],
        "actors": actors,
        "rules": rules,
        "multiplayer": { "tick_rate": 10 }
    });
    Arc::new(SceneSpec::from_json(&doc.to_string()).unwrap())
}

fn append_log(ctx: &mut ActionContext<'_>, entry: &str) {
    let current = ctx
        .global("log")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    ctx.set_global("log", format!("{}{}", current, entry).as_str());
}

fn registry() -> Arc<ActionRegistry> {
    let mut reg = ActionRegistry::new();
    register_builtins(&mut reg);
    reg.register_action("log_a", |ctx| {
        append_log(ctx, "a");
        Ok(ActionOutcome::Done)
    })
    .register_action("log_b", |ctx| {
        append_log(ctx, "b");
        Ok(ActionOutcome::Done)
    })
    .register_action("log_role", |ctx| {
        let role = ctx.role().unwrap_or("?").to_string();
        append_log(ctx, &role);
        Ok(ActionOutcome::Done)
    })
    .register_action("log_collision", |ctx| {
        let entry = ctx
            .collision()
            .map(|c| format!("{}>{}", c.a.uid, c.b.uid))
            .unwrap_or_default();
        append_log(ctx, &entry);
        Ok(ActionOutcome::Done)
    })
    .register_action("count_three_ticks", |ctx| {
        append_log(ctx, "start");
        let mut remaining = 3;
        Ok(ActionOutcome::resume(move |ctx| {
            let count = ctx.global("count").and_then(|v| v.as_i64()).unwrap_or(0);
            ctx.set_global("count", count + 1);
            remaining -= 1;
            Ok(if remaining == 0 {
                Progress::Done
            } else {
                Progress::Pending
            })
        }))
    })
    .register_action("spawn_coin", |ctx| {
        ctx.spawn(SpawnRequest::new("coin", 5.0, 5.0))?;
        Ok(ActionOutcome::Done)
    })
    .register_action("fail", |ctx| {
        append_log(ctx, "x");
        Err(anyhow!("boom"))
    })
    .register_predicate("is_right", |actor, _world| actor.x > 50.0);
    Arc::new(reg)
}

fn interpreter(rules: serde_json::Value, actors: serde_json::Value) -> Interpreter {
    let scene = scene(rules, actors);
    let roles = scene.roles.clone();
    Interpreter::new(scene, &roles, registry(), 7).unwrap()
}

fn log(interp: &Interpreter) -> String {
    interp
        .world()
        .globals
        .get("log")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn keys(phase: Phase, key: &str) -> InputFrame {
    let mut frame = InputFrame::default();
    let set = match phase {
        Phase::Begin => &mut frame.keyboard.begin,
        Phase::On => &mut frame.keyboard.on,
        Phase::End => &mut frame.keyboard.end,
    };
    set.insert(key.to_string());
    frame
}

#[test]
fn test_keyboard_phase_matching() {
    let mut interp = interpreter(
        json!([{ "condition": { "type": "keyboard", "key": "Space", "phase": "begin" }, "action": "log_a" }]),
        json!([]),
    );

    interp.step(&keys(Phase::On, "Space"), &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "");

    let report = interp.step(&keys(Phase::Begin, "Space"), &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "a");
    assert_eq!(
        report.fired,
        vec![FiredRule {
            rule: 0,
            action: "log_a".to_string()
        }]
    );
}

#[test]
fn test_rules_fire_in_specification_order() {
    let mut interp = interpreter(
        json!([
            { "condition": { "type": "keyboard", "key": "k" }, "action": "log_b" },
            { "condition": { "type": "keyboard", "key": "k" }, "action": "log_a" },
            { "condition": { "type": "keyboard", "key": "k" }, "action": "log_b" }
        ]),
        json!([]),
    );

    interp.step(&keys(Phase::On, "k"), &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "bab");
}

#[test]
fn test_collision_matches_swapped_pairs() {
    let mut interp = interpreter(
        json!([{
            "condition": { "type": "collision", "a": { "type": "player" }, "b": { "type": "coin" }, "kind": "overlap" },
            "action": "log_collision"
        }]),
        json!([]),
    );

    let mut frame = InputFrame::default();
    frame.collisions.push(CollisionEvent {
        kind: CollisionKind::Overlap,
        phase: Phase::Begin,
        a: CollisionParty {
            uid: "c1".to_string(),
            actor_type: "coin".to_string(),
        },
        b: CollisionParty {
            uid: "p1".to_string(),
            actor_type: "player".to_string(),
        },
        tile: None,
    });
    // Wrong kind is ignored
    frame.collisions.push(CollisionEvent {
        kind: CollisionKind::Contact,
        ..frame.collisions[0].clone()
    });

    interp.step(&frame, &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "p1>c1");
}

#[test]
fn test_collision_end_phase_only_matches_end_events() {
    let mut interp = interpreter(
        json!([{
            "condition": { "type": "collision", "a": { "type": "player" }, "b": {}, "phase": "end" },
            "action": "log_collision"
        }]),
        json!([]),
    );

    let event = CollisionEvent {
        kind: CollisionKind::Overlap,
        phase: Phase::On,
        a: CollisionParty {
            uid: "p1".to_string(),
            actor_type: "player".to_string(),
        },
        b: CollisionParty {
            uid: "c1".to_string(),
            actor_type: "coin".to_string(),
        },
        tile: None,
    };
    let mut frame = InputFrame::default();
    frame.collisions.push(event.clone());
    interp.step(&frame, &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "");

    frame.collisions[0].phase = Phase::End;
    interp.step(&frame, &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "p1>c1");
}

#[test]
fn test_logical_condition_phases() {
    let mut interp = interpreter(
        json!([
            { "condition": { "type": "logical", "predicate": "is_right", "actor_type": "player", "phase": "begin" }, "action": "log_a" },
            { "condition": { "type": "logical", "predicate": "is_right", "actor_type": "player", "phase": "end" }, "action": "log_b" }
        ]),
        json!([{ "uid": "p1", "type": "player", "x": 0, "y": 0 }]),
    );
    let empty = InputFrame::default();

    interp.step(&empty, &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "");

    interp.world_mut().actor_mut("p1").unwrap().x = 60.0;
    interp.step(&empty, &HashMap::new()).unwrap();
    interp.step(&empty, &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "a");

    interp.world_mut().actor_mut("p1").unwrap().x = 10.0;
    interp.step(&empty, &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "ab");
}

#[test]
fn test_tool_calls_fire_once_per_call_with_role_binding() {
    let mut interp = interpreter(
        json!([{ "condition": { "type": "tool", "name": "jump" }, "action": "log_role" }]),
        json!([]),
    );

    let mut frame = InputFrame::default();
    for role in ["red", "blue"] {
        frame.tools.push(ToolCall {
            name: "jump".to_string(),
            args: json!({}),
            role: Some(role.to_string()),
        });
    }
    frame.tools.push(ToolCall {
        name: "other".to_string(),
        args: json!({}),
        role: Some("green".to_string()),
    });

    interp.step(&frame, &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "redblue");
}

#[test]
fn test_button_condition_matches_by_name() {
    let mut interp = interpreter(
        json!([{ "condition": { "type": "button", "name": "ok" }, "action": "log_role" }]),
        json!([]),
    );

    let mut frame = InputFrame::default();
    frame.buttons.push(ButtonEvent {
        name: "ok".to_string(),
        role: Some("p".to_string()),
    });
    interp.step(&frame, &HashMap::new()).unwrap();
    assert_eq!(log(&interp), "p");
}

#[test]
fn test_multi_tick_action_advances_once_per_tick() {
    let mut interp = interpreter(
        json!([{ "condition": { "type": "keyboard", "key": "go", "phase": "begin" }, "action": "count_three_ticks" }]),
        json!([]),
    );
    let empty = InputFrame::default();
    let count = |i: &Interpreter| i.world().globals["count"].clone();

    let report = interp.step(&keys(Phase::Begin, "go"), &HashMap::new()).unwrap();
    assert_eq!(report.in_flight, 1);
    assert_eq!(count(&interp), FieldValue::Int(0));

    interp.step(&empty, &HashMap::new()).unwrap();
    assert_eq!(count(&interp), FieldValue::Int(1));
    interp.step(&empty, &HashMap::new()).unwrap();
    assert_eq!(count(&interp), FieldValue::Int(2));

    let report = interp.step(&empty, &HashMap::new()).unwrap();
    assert_eq!(count(&interp), FieldValue::Int(3));
    assert_eq!(report.completed, 1);
    assert_eq!(interp.in_flight_count(), 0);

    interp.step(&empty, &HashMap::new()).unwrap();
    assert_eq!(count(&interp), FieldValue::Int(3));
}

#[test]
fn test_spawn_uses_deterministic_uids() {
    let mut interp = interpreter(
        json!([{ "condition": { "type": "keyboard", "key": "s" }, "action": "spawn_coin" }]),
        json!([{ "uid": "coin_1", "type": "coin" }]),
    );

    interp.step(&keys(Phase::On, "s"), &HashMap::new()).unwrap();
    interp.step(&keys(Phase::On, "s"), &HashMap::new()).unwrap();

    let uids: Vec<&str> = interp.world().actors().iter().map(|a| a.uid.as_str()).collect();
    assert_eq!(uids, vec!["coin_1", "coin_2", "coin_3"]);
}

#[test]
fn test_destroy_keeps_inactive_copy_for_report() {
    let mut interp = interpreter(json!([]), json!([{ "uid": "c1", "type": "coin" }, { "uid": "c2", "type": "coin" }]));

    assert!(interp.world_mut().destroy("c1"));
    assert!(!interp.world_mut().destroy("c1"));

    let removed = interp.world_mut().take_removed();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].uid, "c1");
    assert!(!removed[0].active);
    assert!(interp.world().actor("c1").is_none());
    assert!(interp.world().actor("c2").is_some());
}

#[test]
fn test_missing_action_rejected_at_construction() {
    let scene = scene(
        json!([{ "condition": { "type": "keyboard", "key": "k" }, "action": "nope" }]),
        json!([]),
    );
    let result = Interpreter::new(scene, &[], registry(), 1);
    assert!(matches!(result, Err(SceneError::MissingFunction(_))));
}

#[test]
fn test_missing_predicate_rejected_at_construction() {
    let scene = scene(
        json!([{ "condition": { "type": "logical", "predicate": "nope" }, "action": "log_a" }]),
        json!([]),
    );
    let result = Interpreter::new(scene, &[], registry(), 1);
    assert!(matches!(result, Err(SceneError::MissingFunction(_))));
}

#[test]
fn test_action_failure_is_not_transactional() {
    let mut interp = interpreter(
        json!([
            { "condition": { "type": "keyboard", "key": "k" }, "action": "log_a" },
            { "condition": { "type": "keyboard", "key": "k" }, "action": "fail" },
            { "condition": { "type": "keyboard", "key": "k" }, "action": "log_b" }
        ]),
        json!([]),
    );

    let err = interp.step(&keys(Phase::On, "k"), &HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("fail"));
    assert_eq!(log(&interp), "ax");
}

#[test]
fn test_attachment_chain_follows_parent_motion() {
    let mut interp = interpreter(
        json!([]),
        json!([
            { "uid": "p1", "type": "player", "x": 10, "y": 0 },
            { "uid": "h1", "type": "hat", "x": 10, "y": -5, "parent": "p1" },
            { "uid": "h2", "type": "hat", "x": 10, "y": -9, "parent": "h1" }
        ]),
    );

    let mut motion = HashMap::new();
    motion.insert("p1".to_string(), Motion { x: 0.0, y: 0.0, vx: 0.0, vy: 0.0 });
    motion.insert("h1".to_string(), Motion { x: 10.0, y: -5.0, vx: 0.0, vy: 0.0 });
    motion.insert("h2".to_string(), Motion { x: 10.0, y: -9.0, vx: 0.0, vy: 0.0 });

    // p1 moved from x=0 to x=10 this tick
    interp.step(&InputFrame::default(), &motion).unwrap();

    let world = interp.world();
    assert_eq!(world.actor("p1").unwrap().x, 10.0);
    assert_eq!(world.actor("h1").unwrap().x, 20.0);
    assert_eq!(world.actor("h2").unwrap().x, 20.0);
    assert_eq!(world.actor("h2").unwrap().y, -9.0);
}

#[test]
fn test_attachment_cycle_is_noop() {
    let mut interp = interpreter(
        json!([]),
        json!([
            { "uid": "a", "type": "hat", "x": 0, "y": 0, "parent": "b" },
            { "uid": "b", "type": "hat", "x": 5, "y": 0, "parent": "a" }
        ]),
    );

    let mut motion = HashMap::new();
    motion.insert("a".to_string(), Motion { x: -3.0, y: 0.0, vx: 0.0, vy: 0.0 });
    motion.insert("b".to_string(), Motion { x: 5.0, y: 0.0, vx: 0.0, vy: 0.0 });

    interp.step(&InputFrame::default(), &motion).unwrap();

    assert_eq!(interp.world().actor("a").unwrap().x, 0.0);
    assert_eq!(interp.world().actor("b").unwrap().x, 5.0);
}

#[test]
fn test_seeded_rng_is_reproducible() {
    use rand::Rng;

    let mut reg = ActionRegistry::new();
    reg.register_action("roll", |ctx| {
        let roll: i64 = ctx.rng().gen_range(0..1_000_000);
        ctx.set_global("count", roll);
        Ok(ActionOutcome::Done)
    });
    let reg = Arc::new(reg);
    let scene = scene(
        json!([{ "condition": { "type": "keyboard", "key": "r" }, "action": "roll" }]),
        json!([]),
    );

    let run = |seed: u64| {
        let mut interp = Interpreter::new(Arc::clone(&scene), &[], Arc::clone(&reg), seed).unwrap();
        interp.step(&keys(Phase::On, "r"), &HashMap::new()).unwrap();
        interp.world().globals["count"].clone()
    };

    assert_eq!(run(42), run(42));
}
