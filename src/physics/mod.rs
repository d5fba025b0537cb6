//! Axis-aligned box physics for scene actors: integration with tile sweeps,
//! post-action tile rollback, actor-vs-actor separation and collision queries.

mod body;
mod queries;
mod separation;
mod tiles;


pub use body::{tile_blocks, Axis, Body};
pub use tiles::TILE_EPSILON;

use crate::attach::{AttachmentGraph, Motion};
use crate::interpreter::World;
use crate::scene::{MapSpec, SceneSpec};
use glam::DVec2;
use serde::Serialize;
use std::collections::HashMap;

/// Distance within which two boxes (or a box and a tile) count as touching
pub const CONTACT_EPSILON: f64 = 0.01;

/// Overlaps at or below this depth are treated as touching
pub const OVERLAP_EPSILON: f64 = 1e-9;

pub const MAX_SEPARATION_PASSES: usize = 4;

/// What post-action resolution changed
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Resolution {
    /// Bodies restored to their pre-tick position, in the order first rolled back
    pub rolled_back: Vec<String>,
    /// Pairwise pushes applied by separation
    pub pushes: usize,
}

pub struct PhysicsEngine {
    bodies: Vec<Body>,
    index: HashMap<String, usize>,
    map: Option<MapSpec>,
    bounds: Option<DVec2>,
    gravity: f64,
}

impl PhysicsEngine {
    pub fn new(scene: &SceneSpec) -> Self {
        let mut engine = Self {
            bodies: Vec::new(),
            index: HashMap::new(),
            map: None,
            bounds: None,
            gravity: 0.0,
        };
        engine.configure(scene);
        engine
    }

    /// Refresh map, world bounds and gravity from the scene
    pub fn configure(&mut self, scene: &SceneSpec) {
        self.map = scene.map.clone();
        self.bounds = scene.world_size().map(|(w, h)| DVec2::new(w, h));
        self.gravity = scene.world.gravity;
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn body(&self, uid: &str) -> Option<&Body> {
        self.index.get(uid).map(|&i| &self.bodies[i])
    }

    fn body_mut(&mut self, uid: &str) -> Option<&mut Body> {
        match self.index.get(uid) {
            Some(&i) => Some(&mut self.bodies[i]),
            None => None,
        }
    }

    /// Mirror the world's live actors. Existing bodies keep their tick
    /// history; bodies of removed actors are dropped.
    pub fn sync(&mut self, world: &World) {
        let mut previous: HashMap<String, Body> = self
            .bodies
            .drain(..)
            .map(|b| (b.uid.clone(), b))
            .collect();

        self.bodies = world
            .actors()
            .iter()
            .map(|actor| match previous.remove(&actor.uid) {
                Some(mut body) => {
                    body.update_from(actor);
                    body
                }
                None => Body::from_actor(actor),
            })
            .collect();

        self.index = self
            .bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (b.uid.clone(), i))
            .collect();
    }

    /// Record pre-tick position and velocity of every body
    pub fn begin_tick(&mut self) {
        for body in &mut self.bodies {
            body.prev_pos = body.pos;
            body.prev_vel = body.vel;
        }
    }

    /// Pre-tick motion of every body, for attachment propagation
    pub fn motion(&self) -> HashMap<String, Motion> {
        self.bodies
            .iter()
            .map(|b| {
                (
                    b.uid.clone(),
                    Motion {
                        x: b.prev_pos.x,
                        y: b.prev_pos.y,
                        vx: b.prev_vel.x,
                        vy: b.prev_vel.y,
                    },
                )
            })
            .collect()
    }

    pub fn attachment_graph(&self) -> AttachmentGraph {
        AttachmentGraph::build(
            self.bodies
                .iter()
                .map(|b| (b.uid.as_str(), b.parent.as_deref())),
        )
    }

    /// Advance every moving body by `dt`: gravity, then x sweep, then y sweep,
    /// then clamp into world bounds.
    pub fn integrate(&mut self, dt: f64, gravity_enabled: bool) {
        for i in 0..self.bodies.len() {
            let body = &mut self.bodies[i];
            if !body.active || !body.config.enabled {
                continue;
            }
            if body.config.dynamic {
                body.on_ground = false;
                if gravity_enabled {
                    body.vel.y += self.gravity * dt;
                }
            }
            self.step_axis(i, Axis::X, dt);
            self.step_axis(i, Axis::Y, dt);
            self.clamp_to_bounds(i);
        }
    }

    fn step_axis(&mut self, i: usize, axis: Axis, dt: f64) {
        let delta = axis.of(self.bodies[i].vel) * dt;
        if delta == 0.0 {
            return;
        }

        let body = &self.bodies[i];
        let half = axis.of(body.half);
        let mut target = axis.of(body.pos) + delta;
        let mut blocked = false;

        if let Some(map) = &self.map {
            if let Some(edge) = tiles::sweep(map, body.block_mask, axis, body.min(), body.max(), delta) {
                target = if delta > 0.0 { edge - half } else { edge + half };
                blocked = true;
            }
        }

        if let Some(stop) = self.stationary_stop(i, axis, delta) {
            let closer = if delta > 0.0 { stop < target } else { stop > target };
            if closer || !blocked {
                target = stop;
                blocked = true;
            }
        }

        let body = &mut self.bodies[i];
        axis.set(&mut body.pos, target);
        if blocked {
            axis.set(&mut body.vel, 0.0);
            if axis == Axis::Y && delta > 0.0 {
                body.on_ground = true;
            }
        }
    }

    /// Centre at which body `i` first meets a stationary blocker while
    /// travelling `delta` along `axis`
    fn stationary_stop(&self, i: usize, axis: Axis, delta: f64) -> Option<f64> {
        let body = &self.bodies[i];
        if body.block_mask.is_none() || !body.is_solid() {
            return None;
        }
        let cross = axis.other();
        let lead = if delta > 0.0 {
            axis.of(body.max())
        } else {
            axis.of(body.min())
        };
        let half = axis.of(body.half);

        let mut best: Option<f64> = None;
        for (j, other) in self.bodies.iter().enumerate() {
            if j == i || !other.is_solid() || !other.is_stationary() || !body.masks_block(other) {
                continue;
            }
            if other.parent.as_deref() == Some(body.uid.as_str()) || body.parent.as_deref() == Some(other.uid.as_str()) {
                continue;
            }
            if cross.of(body.overlap(other)) <= OVERLAP_EPSILON {
                continue;
            }
            let candidate = if delta > 0.0 {
                let face = axis.of(other.min());
                (face >= lead - OVERLAP_EPSILON && face < lead + delta).then(|| face - half)
            } else {
                let face = axis.of(other.max());
                (face <= lead + OVERLAP_EPSILON && face > lead + delta).then(|| face + half)
            };
            if let Some(c) = candidate {
                best = Some(match best {
                    Some(b) if (delta > 0.0) == (b < c) => b,
                    _ => c,
                });
            }
        }
        best
    }

    fn clamp_to_bounds(&mut self, i: usize) {
        let Some(bounds) = self.bounds else {
            return;
        };
        let body = &mut self.bodies[i];
        for axis in [Axis::X, Axis::Y] {
            let half = axis.of(body.half);
            let (lo, hi) = (half, axis.of(bounds) - half);
            if hi < lo {
                continue;
            }
            let p = axis.of(body.pos);
            if p < lo {
                axis.set(&mut body.pos, lo);
                if axis.of(body.vel) < 0.0 {
                    axis.set(&mut body.vel, 0.0);
                }
            } else if p > hi {
                axis.set(&mut body.pos, hi);
                if axis.of(body.vel) > 0.0 {
                    axis.set(&mut body.vel, 0.0);
                }
                if axis == Axis::Y {
                    body.on_ground = true;
                }
            }
        }
    }

    /// Copy body position and velocity onto the matching actors
    pub fn write_back(&self, world: &mut World) {
        for body in &self.bodies {
            if let Some(actor) = world.actor_mut(&body.uid) {
                actor.x = body.pos.x;
                actor.y = body.pos.y;
                actor.vx = body.vel.x;
                actor.vy = body.vel.y;
            }
        }
    }

    /// Post-action resolution: tile rollback, then separation and tile
    /// rollback repeated until a separation pass pushes nothing into a tile.
    /// Rolled-back bodies are held in place by later separation passes.
    pub fn resolve(&mut self) -> Resolution {
        let graph = self.attachment_graph();
        let mut resolution = Resolution::default();
        self.rollback_tiles(&graph, &mut resolution.rolled_back);
        for _ in 0..MAX_SEPARATION_PASSES {
            let pushes = self.separate(&graph, &mut resolution.rolled_back);
            resolution.pushes += pushes;
            if pushes == 0 || self.rollback_tiles(&graph, &mut resolution.rolled_back) == 0 {
                break;
            }
        }
        resolution
    }

    /// Restore every body overlapping a blocking tile (and its attachment
    /// subtree) to its pre-tick position with zero velocity. Returns the
    /// number of offending bodies.
    fn rollback_tiles(&mut self, graph: &AttachmentGraph, rolled_back: &mut Vec<String>) -> usize {
        let Some(map) = &self.map else {
            return 0;
        };
        let offenders: Vec<String> = self
            .bodies
            .iter()
            .filter(|b| b.is_solid() && tiles::footprint_blocked(map, b.block_mask, b.min(), b.max()))
            .map(|b| b.uid.clone())
            .collect();

        let count = offenders.len();
        for uid in offenders {
            for member in graph.subtree(&uid) {
                self.roll_back(&member, rolled_back);
            }
        }
        count
    }

    fn roll_back(&mut self, uid: &str, rolled_back: &mut Vec<String>) {
        if let Some(body) = self.body_mut(uid) {
            body.pos = body.prev_pos;
            body.vel = DVec2::ZERO;
            if !rolled_back.iter().any(|u| u == uid) {
                rolled_back.push(uid.to_string());
            }
        }
    }
}
