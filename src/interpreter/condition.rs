use crate::scene::{CollisionKind, Condition, Phase, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Tokens (keys or mouse buttons) grouped by input phase
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSet {
    pub begin: BTreeSet<String>,
    pub on: BTreeSet<String>,
    pub end: BTreeSet<String>,
}

impl PhaseSet {
    pub fn contains(&self, phase: Phase, token: &str) -> bool {
        match phase {
            Phase::Begin => self.begin.contains(token),
            Phase::On => self.on.contains(token),
            Phase::End => self.end.contains(token),
        }
    }

    /// Union another set into this one
    pub fn merge(&mut self, other: &PhaseSet) {
        self.begin.extend(other.begin.iter().cloned());
        self.on.extend(other.on.iter().cloned());
        self.end.extend(other.end.iter().cloned());
    }
}

/// One side of a collision event
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollisionParty {
    pub uid: String,
    #[serde(rename = "type")]
    pub actor_type: String,
}

/// Tile cell involved in a tile collision
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileHit {
    pub col: i64,
    pub row: i64,
    pub id: u32,
}

/// Pseudo actor type used for tile collision parties
pub const TILE_TYPE: &str = "Tile";

/// Collision pair observed this tick
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub kind: CollisionKind,
    pub phase: Phase,
    pub a: CollisionParty,
    pub b: CollisionParty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile: Option<TileHit>,
}

impl CollisionEvent {
    pub fn swapped(&self) -> Self {
        Self {
            kind: self.kind,
            phase: self.phase,
            a: self.b.clone(),
            b: self.a.clone(),
            tile: self.tile,
        }
    }
}

/// Tool invocation delivered to the interpreter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub role: Option<String>,
}

/// UI button press delivered to the interpreter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ButtonEvent {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Everything the rules can observe during one tick
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputFrame {
    pub keyboard: PhaseSet,
    pub mouse: PhaseSet,
    pub collisions: Vec<CollisionEvent>,
    pub tools: Vec<ToolCall>,
    pub buttons: Vec<ButtonEvent>,
}

/// Event phase satisfies a requested phase. Instantaneous `begin` events
/// also count as `on`.
fn phase_matches(requested: Phase, observed: Phase) -> bool {
    match requested {
        Phase::On => observed == Phase::Begin || observed == Phase::On,
        other => other == observed,
    }
}

/// Collision events matching a collision condition, oriented so that `a`
/// satisfies the condition's first selector
pub fn matching_collisions(
    frame: &InputFrame,
    a: &Selector,
    b: &Selector,
    kind: Option<CollisionKind>,
    phase: Phase,
) -> Vec<CollisionEvent> {
    frame
        .collisions
        .iter()
        .filter(|ev| kind.map_or(true, |k| k == ev.kind) && phase_matches(phase, ev.phase))
        .filter_map(|ev| {
            if a.matches(&ev.a.uid, &ev.a.actor_type) && b.matches(&ev.b.uid, &ev.b.actor_type) {
                Some(ev.clone())
            } else if a.matches(&ev.b.uid, &ev.b.actor_type) && b.matches(&ev.a.uid, &ev.a.actor_type) {
                Some(ev.swapped())
            } else {
                None
            }
        })
        .collect()
}

/// Evaluate input-only conditions (keyboard and mouse)
pub fn input_matches(frame: &InputFrame, condition: &Condition) -> bool {
    match condition {
        Condition::Keyboard { key, phase } => frame.keyboard.contains(*phase, key),
        Condition::Mouse { button, phase } => frame.mouse.contains(*phase, button),
        _ => false,
    }
}

/// Logical condition phase from this tick's and last tick's truth value
pub fn logical_fires(phase: Phase, now: bool, before: bool) -> bool {
    match phase {
        Phase::On => now,
        Phase::Begin => now && !before,
        Phase::End => !now && before,
    }
}
