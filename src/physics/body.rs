use crate::interpreter::Actor;
use crate::scene::PhysicsSpec;
use glam::DVec2;

/// Axis selector for sweeps and separation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn of(self, v: DVec2) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
        }
    }

    pub fn set(self, v: &mut DVec2, value: f64) {
        match self {
            Axis::X => v.x = value,
            Axis::Y => v.y = value,
        }
    }

    pub fn other(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

/// Physics mirror of one actor. Rebuilt from the actor on every sync.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub uid: String,
    pub actor_type: String,
    pub pos: DVec2,
    pub vel: DVec2,
    /// Position at the start of the current tick
    pub prev_pos: DVec2,
    pub prev_vel: DVec2,
    pub half: DVec2,
    pub config: PhysicsSpec,
    pub active: bool,
    pub block_mask: Option<i64>,
    pub parent: Option<String>,
    pub on_ground: bool,
}

impl Body {
    pub fn from_actor(actor: &Actor) -> Self {
        let pos = DVec2::new(actor.x, actor.y);
        let vel = DVec2::new(actor.vx, actor.vy);
        Self {
            uid: actor.uid.clone(),
            actor_type: actor.actor_type.clone(),
            pos,
            vel,
            prev_pos: pos,
            prev_vel: vel,
            half: DVec2::new(actor.w, actor.h) * 0.5,
            config: actor.physics,
            active: actor.active,
            block_mask: actor.block_mask,
            parent: actor.parent.clone(),
            on_ground: false,
        }
    }

    /// Refresh from the actor, keeping tick history and ground state
    pub fn update_from(&mut self, actor: &Actor) {
        self.actor_type.clone_from(&actor.actor_type);
        self.pos = DVec2::new(actor.x, actor.y);
        self.vel = DVec2::new(actor.vx, actor.vy);
        self.half = DVec2::new(actor.w, actor.h) * 0.5;
        self.config = actor.physics;
        self.active = actor.active;
        self.block_mask = actor.block_mask;
        self.parent.clone_from(&actor.parent);
    }

    pub fn min(&self) -> DVec2 {
        self.pos - self.half
    }

    pub fn max(&self) -> DVec2 {
        self.pos + self.half
    }

    /// Takes part in collision queries at all
    pub fn is_solid(&self) -> bool {
        self.active && self.config.enabled && self.config.collidable
    }

    pub fn is_stationary(&self) -> bool {
        !self.config.dynamic && self.vel == DVec2::ZERO
    }

    /// Equal non-null masks block each other
    pub fn masks_block(&self, other: &Body) -> bool {
        matches!((self.block_mask, other.block_mask), (Some(a), Some(b)) if a == b)
    }

    /// Overlap extent on each axis; negative components are gaps
    pub fn overlap(&self, other: &Body) -> DVec2 {
        let extent = self.half + other.half;
        extent - (self.pos - other.pos).abs()
    }

    /// Displacement since the start of the tick
    pub fn moved(&self) -> DVec2 {
        self.pos - self.prev_pos
    }
}

/// A tile blocks an actor only when both masks exist and the tile's is greater
pub fn tile_blocks(actor_mask: Option<i64>, tile_mask: Option<i64>) -> bool {
    matches!((actor_mask, tile_mask), (Some(a), Some(t)) if t > a)
}
