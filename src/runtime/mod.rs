//! One fixed simulation tick: physics, collision detection, rules,
//! post-action resolution and animation, in that order.

use crate::animation::{AnimationState, Animator};
use crate::interpreter::{
    Actor, ActionRegistry, CollisionEvent, CollisionParty, FiredRule, InputFrame, Interpreter, World,
    WorldSnapshot, TILE_TYPE,
};
use crate::physics::PhysicsEngine;
use crate::scene::{CollisionKind, Phase, RoleSpec, SceneError, SceneSpec};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;


/// Wall-clock pacing of the fixed-step loop
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pace {
    /// Game seconds per wall-clock second
    pub time_scale: f64,
    /// Most ticks a single clock advance may run
    pub max_catchup_steps: u32,
}

impl Pace {
    pub fn from_scene(scene: &SceneSpec) -> Self {
        Self {
            time_scale: scene.multiplayer.game_time_scale,
            max_catchup_steps: scene.multiplayer.max_catchup_steps,
        }
    }
}

/// Result of one tick
#[derive(Clone, Debug, Default, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub turn: u64,
    /// Actors destroyed this tick, with `active = false`
    pub removed: Vec<Actor>,
    /// Collision events detected this tick, with phases
    pub collisions: Vec<CollisionEvent>,
    pub rolled_back: Vec<String>,
    pub fired: Vec<FiredRule>,
}

/// Serializable state of a running simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    #[serde(flatten)]
    pub world: WorldSnapshot,
    pub animations: BTreeMap<String, AnimationState>,
}

type CollisionKey = (CollisionKind, String, String);

fn key_of(event: &CollisionEvent) -> CollisionKey {
    (event.kind, event.a.uid.clone(), event.b.uid.clone())
}

pub struct RuntimeCore {
    interpreter: Interpreter,
    physics: PhysicsEngine,
    animator: Animator,
    /// Collision pairs seen last tick
    previous: BTreeMap<CollisionKey, CollisionEvent>,
    pace: Pace,
    /// Unconsumed scaled game time, in seconds
    accumulator: f64,
}

impl RuntimeCore {
    pub fn new(
        scene: Arc<SceneSpec>,
        roles: &[RoleSpec],
        registry: Arc<ActionRegistry>,
        seed: u64,
    ) -> Result<Self, SceneError> {
        let pace = Pace::from_scene(&scene);
        let physics = PhysicsEngine::new(&scene);
        let interpreter = Interpreter::new(scene, roles, registry, seed)?;
        let mut core = Self {
            interpreter,
            physics,
            animator: Animator::new(),
            previous: BTreeMap::new(),
            pace,
            accumulator: 0.0,
        };
        core.physics.sync(core.interpreter.world());
        Ok(core)
    }

    pub fn world(&self) -> &World {
        self.interpreter.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.interpreter.world_mut()
    }

    pub fn physics(&self) -> &PhysicsEngine {
        &self.physics
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    /// Fixed step length in game seconds
    pub fn dt(&self) -> f64 {
        self.interpreter.dt()
    }

    pub fn pace(&self) -> Pace {
        self.pace
    }

    pub fn set_pace(&mut self, pace: Pace) {
        self.pace = pace;
    }

    /// Run one fixed tick with the given input
    pub fn step(&mut self, input: &InputFrame) -> Result<TickReport> {
        let dt = self.interpreter.dt();
        let scene = Arc::clone(self.interpreter.world().scene());

        self.physics.configure(&scene);
        self.physics.sync(self.interpreter.world());
        self.physics.begin_tick();
        self.interpreter.world_mut().begin_tick();

        let gravity = self.interpreter.world().gravity_enabled();
        self.physics.integrate(dt, gravity);
        self.physics.write_back(self.interpreter.world_mut());

        let collisions = self.detect_collisions();
        let mut frame = input.clone();
        frame.collisions.extend(collisions.iter().cloned());

        let motion = self.physics.motion();
        let step = self.interpreter.step(&frame, &motion)?;

        self.physics.sync(self.interpreter.world());
        let resolution = self.physics.resolve();
        self.physics.write_back(self.interpreter.world_mut());

        self.animator.update(&scene, self.physics.bodies(), dt);

        let world = self.interpreter.world_mut();
        let report = TickReport {
            tick: world.tick(),
            turn: world.turn(),
            removed: world.take_removed(),
            collisions,
            rolled_back: resolution.rolled_back,
            fired: step.fired,
        };
        trace!(
            tick = report.tick,
            fired = report.fired.len(),
            collisions = report.collisions.len(),
            "Tick complete"
        );
        Ok(report)
    }

    /// Feed elapsed wall-clock seconds into the accumulator and return how
    /// many fixed ticks are due. Time beyond the catch-up cap is dropped.
    pub fn due_steps(&mut self, elapsed: f64) -> u32 {
        let dt = self.interpreter.dt();
        self.accumulator += elapsed.max(0.0) * self.pace.time_scale;
        let due = (self.accumulator / dt).floor();
        self.accumulator -= due * dt;
        (due as u32).min(self.pace.max_catchup_steps)
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            world: self.interpreter.world().snapshot(),
            animations: self.animator.states().clone(),
        }
    }

    /// Query overlaps, contacts and tile overlaps and assign phases by
    /// comparing with last tick's pairs
    fn detect_collisions(&mut self) -> Vec<CollisionEvent> {
        let mut observed = Vec::new();
        let pair = |kind, a: CollisionParty, b: CollisionParty| CollisionEvent {
            kind,
            phase: Phase::On,
            a,
            b,
            tile: None,
        };

        for (a, b) in self.physics.overlaps() {
            observed.push(pair(CollisionKind::Overlap, a, b));
        }
        for (a, b) in self.physics.contacts() {
            observed.push(pair(CollisionKind::Contact, a, b));
        }
        for (a, hit) in self.physics.tile_overlaps() {
            let tile = CollisionParty {
                uid: format!("tile_{}_{}", hit.col, hit.row),
                actor_type: TILE_TYPE.to_string(),
            };
            observed.push(CollisionEvent {
                tile: Some(hit),
                ..pair(CollisionKind::Tile, a, tile)
            });
        }

        let current: BTreeSet<CollisionKey> = observed.iter().map(key_of).collect();
        let mut events = Vec::with_capacity(observed.len());
        for mut event in observed.iter().cloned() {
            if !self.previous.contains_key(&key_of(&event)) {
                event.phase = Phase::Begin;
            }
            events.push(event);
        }
        for (key, event) in &self.previous {
            if !current.contains(key) {
                events.push(CollisionEvent {
                    phase: Phase::End,
                    ..event.clone()
                });
            }
        }

        self.previous = observed.into_iter().map(|e| (key_of(&e), e)).collect();
        events
    }
}

/// Hash a textual session seed into the RNG seed (64-bit FNV-1a)
pub fn seed_hash(seed: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    seed.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}
