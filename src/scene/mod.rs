//! Scene specification: the immutable document produced by the authoring compiler.
//!
//! Everything a session needs to build its world comes from here: actor
//! templates and instances, globals, rules, the tile map, cameras, roles,
//! the multiplayer policy and the tool registry.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

mod schema;
mod validation;

pub use schema::{build_fields, check_field, FieldType, FieldValue, Fields, Schema, SchemaError};
pub use validation::{validate_scene, SceneError};

/// Complete scene document
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSpec {
    pub world: WorldSpec,
    pub schemas: BTreeMap<String, Schema>,
    pub templates: BTreeMap<String, ActorTemplate>,
    pub actors: Vec<ActorSpec>,
    pub globals: Vec<GlobalSpec>,
    pub rules: Vec<RuleSpec>,
    pub map: Option<MapSpec>,
    pub cameras: Vec<CameraSpec>,
    pub roles: Vec<RoleSpec>,
    pub multiplayer: MultiplayerSpec,
    pub tools: Vec<ToolSpec>,
    pub symbolic: SymbolicSpec,
}

impl SceneSpec {
    /// Parse and validate a scene document
    pub fn from_json(text: &str) -> Result<Self> {
        let scene: SceneSpec = serde_json::from_str(text).context("Failed to parse scene JSON")?;
        validate_scene(&scene).map_err(|e| anyhow::anyhow!("Invalid scene: {}", e))?;
        Ok(scene)
    }

    /// Load a scene document from disk
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene file {}", path))?;
        Self::from_json(&contents)
    }

    pub fn template(&self, actor_type: &str) -> Option<&ActorTemplate> {
        self.templates.get(actor_type)
    }

    pub fn schema(&self, actor_type: &str) -> Option<&Schema> {
        self.schemas.get(actor_type)
    }

    pub fn camera(&self, id: &str) -> Option<&CameraSpec> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn role(&self, id: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.id == id)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// World extent in world units: map pixel size, else the declared world size
    pub fn world_size(&self) -> Option<(f64, f64)> {
        if let Some(map) = &self.map {
            return Some((map.pixel_width(), map.pixel_height()));
        }
        match (self.world.width, self.world.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

/// Global world settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSpec {
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// Downward acceleration in world units per second squared
    pub gravity: f64,
    pub gravity_enabled: bool,
    /// Render surface in pixels (used to size symbolic viewports)
    pub surface: Option<SurfaceSpec>,
}

impl Default for WorldSpec {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            gravity: 0.0,
            gravity_enabled: true,
            surface: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSpec {
    pub width: f64,
    pub height: f64,
}

/// Physics participation flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSpec {
    pub enabled: bool,
    pub dynamic: bool,
    pub collidable: bool,
}

impl Default for PhysicsSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            dynamic: false,
            collidable: true,
        }
    }
}

/// Per-type actor defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorTemplate {
    pub w: f64,
    pub h: f64,
    pub z: i32,
    pub block_mask: Option<i64>,
    pub sprite: Option<String>,
    pub symbol: Option<char>,
    pub physics: PhysicsSpec,
    pub fields: Fields,
    /// Generic clip name (idle/walk/jump/fall) to concrete clip name
    pub animations: BTreeMap<String, String>,
}

impl Default for ActorTemplate {
    fn default() -> Self {
        Self {
            w: 32.0,
            h: 32.0,
            z: 0,
            block_mask: None,
            sprite: None,
            symbol: None,
            physics: PhysicsSpec::default(),
            fields: Fields::new(),
            animations: BTreeMap::new(),
        }
    }
}

/// Actor instance placed in the scene. Unset values come from the template.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorSpec {
    pub uid: String,
    #[serde(rename = "type")]
    pub actor_type: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub w: Option<f64>,
    #[serde(default)]
    pub h: Option<f64>,
    #[serde(default)]
    pub z: Option<i32>,
    #[serde(default)]
    pub block_mask: Option<i64>,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub physics: Option<PhysicsSpec>,
    #[serde(default)]
    pub fields: Fields,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GlobalSpec {
    pub name: String,
    pub value: FieldValue,
}

/// Rule: condition → action name
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleSpec {
    pub condition: Condition,
    pub action: String,
}

/// Input phase of a condition or event
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Begin,
    #[default]
    On,
    End,
}

/// Kind of collision event produced by the physics queries
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionKind {
    /// AABB overlap, mask ignored
    Overlap,
    /// Equal-mask actors touching
    Contact,
    /// Actor footprint over a masked tile
    Tile,
}

/// Actor selector used by collision conditions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selector {
    #[serde(rename = "type")]
    pub actor_type: Option<String>,
    pub uid: Option<String>,
}

impl Selector {
    pub fn of_type(actor_type: &str) -> Self {
        Self {
            actor_type: Some(actor_type.to_string()),
            uid: None,
        }
    }

    pub fn matches(&self, uid: &str, actor_type: &str) -> bool {
        self.actor_type.as_deref().map_or(true, |t| t == actor_type)
            && self.uid.as_deref().map_or(true, |u| u == uid)
    }
}

/// Rule condition variants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Keyboard {
        key: String,
        #[serde(default)]
        phase: Phase,
    },
    Mouse {
        button: String,
        #[serde(default)]
        phase: Phase,
    },
    Collision {
        a: Selector,
        b: Selector,
        #[serde(default)]
        kind: Option<CollisionKind>,
        #[serde(default)]
        phase: Phase,
    },
    Logical {
        predicate: String,
        #[serde(default)]
        actor_type: Option<String>,
        #[serde(default)]
        phase: Phase,
    },
    Tool {
        name: String,
        #[serde(default)]
        phase: Phase,
    },
    Button {
        name: String,
        #[serde(default)]
        phase: Phase,
    },
}

/// Tile map
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapSpec {
    pub width: usize,
    pub height: usize,
    pub tile_size: f64,
    /// Row-major tile ids, `tiles[row][col]`; 0 is empty
    pub tiles: Vec<Vec<u32>>,
    #[serde(default)]
    pub tile_defs: BTreeMap<u32, TileDef>,
}

impl MapSpec {
    pub fn pixel_width(&self) -> f64 {
        self.width as f64 * self.tile_size
    }

    pub fn pixel_height(&self) -> f64 {
        self.height as f64 * self.tile_size
    }

    /// Tile id at a cell; out-of-grid cells are empty
    pub fn tile_at(&self, col: i64, row: i64) -> u32 {
        if col < 0 || row < 0 {
            return 0;
        }
        self.tiles
            .get(row as usize)
            .and_then(|r| r.get(col as usize))
            .copied()
            .unwrap_or(0)
    }

    pub fn def(&self, id: u32) -> Option<&TileDef> {
        self.tile_defs.get(&id)
    }

    /// Block mask of the tile at a cell (None for empty or unmasked tiles)
    pub fn mask_at(&self, col: i64, row: i64) -> Option<i64> {
        match self.tile_at(col, row) {
            0 => None,
            id => self.def(id).and_then(|d| d.block_mask),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TileDef {
    pub block_mask: Option<i64>,
    pub sprite: Option<String>,
    pub color: Option<String>,
    pub symbol: Option<char>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub id: String,
    #[serde(default)]
    pub follow: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

/// Multiplayer participant kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Human,
    Ai,
    Hybrid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleSpec {
    pub id: String,
    pub kind: RoleKind,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub camera: Option<String>,
    /// UI fragment scoped to this role (opaque to the runtime)
    #[serde(default)]
    pub ui: Option<Value>,
    /// Fields that live in shared world state
    #[serde(default)]
    pub server_fields: Fields,
    /// Client-owned fields; never copied into world state
    #[serde(default)]
    pub local_fields: Fields,
}

/// Tick scheduling policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    Continuous,
    #[serde(alias = "turn")]
    StrictTurn,
    Hybrid,
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopMode::Continuous => write!(f, "continuous"),
            LoopMode::StrictTurn => write!(f, "strict_turn"),
            LoopMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplayerSpec {
    pub default_loop: LoopMode,
    /// Fixed ticks per game second
    pub tick_rate: u32,
    /// Declared but not enforced by the schedulers
    pub turn_timeout_ms: Option<u64>,
    /// Declared but not enforced by the schedulers
    pub hybrid_window_ms: Option<u64>,
    pub game_time_scale: f64,
    pub max_catchup_steps: u32,
}

impl Default for MultiplayerSpec {
    fn default() -> Self {
        Self {
            default_loop: LoopMode::Continuous,
            tick_rate: 30,
            turn_timeout_ms: None,
            hybrid_window_ms: None,
            game_time_scale: 1.0,
            max_catchup_steps: 5,
        }
    }
}

/// Tool an agent may call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Argument schema, passed through to clients untouched
    #[serde(default)]
    pub parameters: Value,
    /// Roles the tool is offered to (None = every role)
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

impl ToolSpec {
    pub fn offered_to(&self, role: &str) -> bool {
        self.roles
            .as_ref()
            .map_or(true, |roles| roles.iter().any(|r| r == role))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolicSpec {
    pub crop: Option<CropSpec>,
    pub empty: char,
}

impl Default for SymbolicSpec {
    fn default() -> Self {
        Self {
            crop: None,
            empty: '.',
        }
    }
}

/// Viewport size in cells
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropSpec {
    pub cols: usize,
    pub rows: usize,
}
