//! Rule interpreter: owns live world state, matches rule conditions against
//! one tick's input and dispatches the bound action functions.

mod builtins;
mod condition;
mod context;
mod registry;
mod world;

#[cfg(test)]
mod tests;

pub use builtins::register_builtins;
pub use condition::{
    ButtonEvent, CollisionEvent, CollisionParty, InputFrame, PhaseSet, TileHit, ToolCall, TILE_TYPE,
};
pub use context::{ActionContext, Binding};
pub use registry::{ActionFn, ActionOutcome, ActionRegistry, MultiTickAction, PredicateFn, Progress};
pub use world::{Actor, SpawnRequest, World, WorldSnapshot};

use crate::attach::{AttachmentGraph, Motion};
use crate::scene::{Condition, RoleSpec, SceneError, SceneSpec};
use anyhow::{anyhow, Context, Result};
use condition::{input_matches, logical_fires, matching_collisions};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Action registered by a rule that is still running
struct InFlight {
    action: String,
    binding: Binding,
    task: Box<dyn MultiTickAction>,
}

/// Rule invocation recorded during a step
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FiredRule {
    pub rule: usize,
    pub action: String,
}

/// Outcome of one interpreter step
#[derive(Clone, Debug, Default, Serialize)]
pub struct StepReport {
    pub fired: Vec<FiredRule>,
    /// Multi-tick actions that finished this step
    pub completed: usize,
    /// Multi-tick actions still running after this step
    pub in_flight: usize,
}

pub struct Interpreter {
    registry: Arc<ActionRegistry>,
    world: World,
    in_flight: Vec<InFlight>,
    /// Last truth value of each logical rule, indexed by rule position
    logical_prev: Vec<bool>,
    rng: ChaCha8Rng,
    dt: f64,
}

impl Interpreter {
    pub fn new(
        scene: Arc<SceneSpec>,
        roles: &[RoleSpec],
        registry: Arc<ActionRegistry>,
        seed: u64,
    ) -> Result<Self, SceneError> {
        registry.validate_scene(&scene)?;
        let dt = 1.0 / scene.multiplayer.tick_rate as f64;
        let rule_count = scene.rules.len();
        let world = World::new(scene, roles)?;

        Ok(Self {
            registry,
            world,
            in_flight: Vec::new(),
            logical_prev: vec![false; rule_count],
            rng: ChaCha8Rng::seed_from_u64(seed),
            dt,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Run one interpreter pass.
    ///
    /// `motion` holds each body's pre-tick position and velocity; it drives
    /// attachment propagation once all rules ran. The pass is not
    /// transactional: on error, effects of earlier actions remain.
    pub fn step(&mut self, frame: &InputFrame, motion: &HashMap<String, Motion>) -> Result<StepReport> {
        let mut report = StepReport::default();

        report.completed = self.advance_in_flight()?;

        let scene = Arc::clone(self.world.scene());
        for (idx, rule) in scene.rules.iter().enumerate() {
            for binding in self.resolve(idx, &rule.condition, frame) {
                debug!(rule = idx, action = %rule.action, "Rule fired");
                self.invoke(&rule.action, binding)?;
                report.fired.push(FiredRule {
                    rule: idx,
                    action: rule.action.clone(),
                });
            }
        }

        propagate_attachments(&mut self.world, motion);

        report.in_flight = self.in_flight.len();
        Ok(report)
    }

    /// Advance every running multi-tick action by exactly one step
    fn advance_in_flight(&mut self) -> Result<usize> {
        let mut completed = 0;
        let mut i = 0;
        while i < self.in_flight.len() {
            let progress = {
                let entry = &mut self.in_flight[i];
                let mut ctx = ActionContext::new(&mut self.world, &mut self.rng, &entry.binding, self.dt);
                entry.task.advance(&mut ctx)
            };
            match progress {
                Ok(Progress::Pending) => i += 1,
                Ok(Progress::Done) => {
                    self.in_flight.remove(i);
                    completed += 1;
                }
                Err(e) => {
                    let failed = self.in_flight.remove(i);
                    return Err(e.context(format!("multi-tick action '{}' failed", failed.action)));
                }
            }
        }
        Ok(completed)
    }

    /// Bindings for every way `condition` matches this frame
    fn resolve(&mut self, idx: usize, condition: &Condition, frame: &InputFrame) -> Vec<Binding> {
        let bare = Binding {
            rule: idx,
            ..Default::default()
        };

        match condition {
            Condition::Keyboard { .. } | Condition::Mouse { .. } => {
                if input_matches(frame, condition) {
                    vec![bare]
                } else {
                    Vec::new()
                }
            }
            Condition::Collision { a, b, kind, phase } => matching_collisions(frame, a, b, *kind, *phase)
                .into_iter()
                .map(|ev| Binding {
                    collision: Some(ev),
                    ..bare.clone()
                })
                .collect(),
            Condition::Logical {
                predicate,
                actor_type,
                phase,
            } => {
                let Some(pred) = self.registry.predicate(predicate).cloned() else {
                    return Vec::new();
                };
                let hit = self
                    .world
                    .actors()
                    .iter()
                    .filter(|a| actor_type.as_deref().map_or(true, |t| t == a.actor_type))
                    .find(|a| pred(a, &self.world))
                    .map(|a| a.uid.clone());

                let now = hit.is_some();
                let before = std::mem::replace(&mut self.logical_prev[idx], now);
                if logical_fires(*phase, now, before) {
                    vec![Binding { actor: hit, ..bare }]
                } else {
                    Vec::new()
                }
            }
            Condition::Tool { name, .. } => frame
                .tools
                .iter()
                .filter(|t| &t.name == name)
                .map(|t| Binding {
                    tool: Some(t.clone()),
                    ..bare.clone()
                })
                .collect(),
            Condition::Button { name, .. } => frame
                .buttons
                .iter()
                .filter(|b| &b.name == name)
                .map(|b| Binding {
                    button: Some(b.clone()),
                    ..bare.clone()
                })
                .collect(),
        }
    }

    fn invoke(&mut self, action: &str, binding: Binding) -> Result<()> {
        let function = self
            .registry
            .action(action)
            .cloned()
            .ok_or_else(|| anyhow!("action '{}' is not registered", action))?;

        let outcome = {
            let mut ctx = ActionContext::new(&mut self.world, &mut self.rng, &binding, self.dt);
            function(&mut ctx).with_context(|| format!("action '{}' failed", action))?
        };

        if let ActionOutcome::Continue(task) = outcome {
            self.in_flight.push(InFlight {
                action: action.to_string(),
                binding,
                task,
            });
        }
        Ok(())
    }
}

/// Shift each attached child by its parent's movement this tick.
///
/// Deltas accumulate down the chain: a child inherits its parent's own
/// delta plus whatever the parent inherited. Actors caught in a parent
/// cycle are not reachable from any root and stay where they are.
fn propagate_attachments(world: &mut World, motion: &HashMap<String, Motion>) {
    let graph = AttachmentGraph::build(
        world
            .actors()
            .iter()
            .map(|a| (a.uid.as_str(), a.parent.as_deref())),
    );

    let own: HashMap<String, Motion> = world
        .actors()
        .iter()
        .map(|a| {
            let delta = match motion.get(&a.uid) {
                Some(prev) => Motion {
                    x: a.x - prev.x,
                    y: a.y - prev.y,
                    vx: a.vx - prev.vx,
                    vy: a.vy - prev.vy,
                },
                None => Motion::default(),
            };
            (a.uid.clone(), delta)
        })
        .collect();

    let roots: Vec<String> = graph.roots().map(String::from).collect();
    let mut visited = HashSet::new();
    for root in roots {
        let mut stack = vec![(root, Motion::default())];
        while let Some((uid, inherited)) = stack.pop() {
            if !visited.insert(uid.clone()) {
                continue;
            }
            if inherited != Motion::default() {
                if let Some(actor) = world.actor_mut(&uid) {
                    actor.x += inherited.x;
                    actor.y += inherited.y;
                    actor.vx += inherited.vx;
                    actor.vy += inherited.vy;
                }
            }
            let own_delta = own.get(&uid).copied().unwrap_or_default();
            let total = Motion {
                x: own_delta.x + inherited.x,
                y: own_delta.y + inherited.y,
                vx: own_delta.vx + inherited.vx,
                vy: own_delta.vy + inherited.vy,
            };
            for child in graph.children(&uid).iter().rev() {
                stack.push((child.clone(), total));
            }
        }
    }
}
