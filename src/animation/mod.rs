//! Motion-driven clip selection for actors with animation tables.

use crate::physics::Body;
use crate::scene::SceneSpec;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;


/// Horizontal speed above which a body counts as walking
pub const WALK_THRESHOLD: f64 = 1.0;

const VERTICAL_EPSILON: f64 = 1e-6;

/// Generic clip chosen from motion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clip {
    Idle,
    Walk,
    Jump,
    Fall,
}

impl Clip {
    pub fn as_str(&self) -> &'static str {
        match self {
            Clip::Idle => "idle",
            Clip::Walk => "walk",
            Clip::Jump => "jump",
            Clip::Fall => "fall",
        }
    }
}

impl fmt::Display for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Left,
    #[default]
    Right,
}

/// Current animation of one actor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationState {
    pub clip: Clip,
    /// Concrete clip name from the template's animation table
    pub name: String,
    pub facing: Facing,
    /// Seconds since the clip started
    pub time: f64,
}

/// Pick a clip from velocity (y grows downward) and ground contact
pub fn choose_clip(vel: DVec2, airborne: bool) -> Clip {
    if airborne && vel.y < -VERTICAL_EPSILON {
        Clip::Jump
    } else if airborne && vel.y > VERTICAL_EPSILON {
        Clip::Fall
    } else if vel.x.abs() > WALK_THRESHOLD {
        Clip::Walk
    } else {
        Clip::Idle
    }
}

/// Facing follows the sign of vx and is kept when vx is zero
pub fn next_facing(current: Facing, vx: f64) -> Facing {
    if vx > 0.0 {
        Facing::Right
    } else if vx < 0.0 {
        Facing::Left
    } else {
        current
    }
}

#[derive(Debug, Default)]
pub struct Animator {
    states: BTreeMap<String, AnimationState>,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every body's animation by `dt`. States of bodies that no
    /// longer exist are dropped.
    pub fn update(&mut self, scene: &SceneSpec, bodies: &[Body], dt: f64) {
        let mut next = BTreeMap::new();
        for body in bodies.iter().filter(|b| b.active) {
            let airborne = body.config.dynamic && !body.on_ground;
            let clip = choose_clip(body.vel, airborne);
            let name = scene
                .template(&body.actor_type)
                .and_then(|t| t.animations.get(clip.as_str()))
                .cloned()
                .unwrap_or_else(|| clip.as_str().to_string());

            let state = match self.states.remove(&body.uid) {
                Some(prev) if prev.clip == clip => AnimationState {
                    clip,
                    name,
                    facing: next_facing(prev.facing, body.vel.x),
                    time: prev.time + dt,
                },
                prev => AnimationState {
                    clip,
                    name,
                    facing: next_facing(prev.map(|p| p.facing).unwrap_or_default(), body.vel.x),
                    time: 0.0,
                },
            };
            next.insert(body.uid.clone(), state);
        }
        self.states = next;
    }

    pub fn state(&self, uid: &str) -> Option<&AnimationState> {
        self.states.get(uid)
    }

    pub fn states(&self) -> &BTreeMap<String, AnimationState> {
        &self.states
    }
}
