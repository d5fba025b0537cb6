use crate::scene::{
    build_fields, check_field, ActorSpec, FieldValue, Fields, PhysicsSpec, RoleSpec, SceneError,
    SceneSpec, SchemaError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Live simulated entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub uid: String,
    #[serde(rename = "type")]
    pub actor_type: String,
    /// Center position
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub z: i32,
    pub active: bool,
    pub block_mask: Option<i64>,
    pub vx: f64,
    pub vy: f64,
    pub parent: Option<String>,
    pub sprite: Option<String>,
    pub physics: PhysicsSpec,
    pub fields: Fields,
}

impl Actor {
    /// Build an actor from a scene instance, applying template defaults
    pub fn from_spec(scene: &SceneSpec, spec: &ActorSpec) -> Result<Self, SchemaError> {
        let template = scene.template(&spec.actor_type).cloned().unwrap_or_default();
        let fields = build_fields(scene.schema(&spec.actor_type), &template.fields, &spec.fields)?;

        Ok(Self {
            uid: spec.uid.clone(),
            actor_type: spec.actor_type.clone(),
            x: spec.x,
            y: spec.y,
            w: spec.w.unwrap_or(template.w),
            h: spec.h.unwrap_or(template.h),
            z: spec.z.unwrap_or(template.z),
            active: spec.active,
            block_mask: spec.block_mask.or(template.block_mask),
            vx: spec.vx,
            vy: spec.vy,
            parent: spec.parent.clone(),
            sprite: spec.sprite.clone().or(template.sprite),
            physics: spec.physics.unwrap_or(template.physics),
            fields,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Request to create an actor at runtime
#[derive(Clone, Debug, Default)]
pub struct SpawnRequest {
    pub actor_type: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub parent: Option<String>,
    pub fields: Fields,
}

impl SpawnRequest {
    pub fn new(actor_type: &str, x: f64, y: f64) -> Self {
        Self {
            actor_type: actor_type.to_string(),
            x,
            y,
            ..Default::default()
        }
    }
}

/// Serializable copy of world state (ordered, byte-stable)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub turn: u64,
    pub gravity_enabled: bool,
    pub globals: Fields,
    pub roles: BTreeMap<String, Fields>,
    pub actors: Vec<Actor>,
}

/// Live world state owned by the interpreter
pub struct World {
    scene: Arc<SceneSpec>,
    actors: Vec<Actor>,
    /// uid -> position in `actors`; rebuilt after removals
    index: HashMap<String, usize>,
    pub globals: Fields,
    /// Server-owned role fields
    roles: BTreeMap<String, Fields>,
    tick: u64,
    turn: u64,
    gravity_enabled: bool,
    removed: Vec<Actor>,
    spawn_counter: u64,
}

impl World {
    pub fn new(scene: Arc<SceneSpec>, roles: &[RoleSpec]) -> Result<Self, SceneError> {
        let mut actors = Vec::with_capacity(scene.actors.len());
        for spec in &scene.actors {
            let actor = Actor::from_spec(&scene, spec).map_err(|error| SceneError::Field {
                owner: format!("actor '{}'", spec.uid),
                error,
            })?;
            actors.push(actor);
        }

        let globals = scene
            .globals
            .iter()
            .map(|g| (g.name.clone(), g.value.clone()))
            .collect();

        let roles = roles
            .iter()
            .map(|r| (r.id.clone(), r.server_fields.clone()))
            .collect();

        let gravity_enabled = scene.world.gravity_enabled;
        let mut world = Self {
            scene,
            actors,
            index: HashMap::new(),
            globals,
            roles,
            tick: 0,
            turn: 0,
            gravity_enabled,
            removed: Vec::new(),
            spawn_counter: 0,
        };
        world.reindex();
        Ok(world)
    }

    pub fn scene(&self) -> &Arc<SceneSpec> {
        &self.scene
    }

    fn reindex(&mut self) {
        self.index = self
            .actors
            .iter()
            .enumerate()
            .map(|(i, a)| (a.uid.clone(), i))
            .collect();
    }

    /// Live actors in specification/spawn order
    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn actor(&self, uid: &str) -> Option<&Actor> {
        self.index.get(uid).map(|&i| &self.actors[i])
    }

    pub fn actor_mut(&mut self, uid: &str) -> Option<&mut Actor> {
        match self.index.get(uid) {
            Some(&i) => Some(&mut self.actors[i]),
            None => None,
        }
    }

    pub fn actors_of_type<'a>(&'a self, actor_type: &'a str) -> impl Iterator<Item = &'a Actor> {
        self.actors.iter().filter(move |a| a.actor_type == actor_type)
    }

    /// Create an actor at runtime with a deterministic uid `<type>_<n>`
    pub fn spawn(&mut self, request: SpawnRequest) -> Result<String, SceneError> {
        let scene = Arc::clone(&self.scene);
        if scene.template(&request.actor_type).is_none() && scene.schema(&request.actor_type).is_none() {
            return Err(SceneError::UnknownActorType {
                uid: String::new(),
                actor_type: request.actor_type,
            });
        }

        let uid = loop {
            self.spawn_counter += 1;
            let candidate = format!("{}_{}", request.actor_type, self.spawn_counter);
            if !self.index.contains_key(&candidate) {
                break candidate;
            }
        };

        let spec = ActorSpec {
            uid: uid.clone(),
            actor_type: request.actor_type,
            x: request.x,
            y: request.y,
            w: None,
            h: None,
            z: None,
            block_mask: None,
            vx: request.vx,
            vy: request.vy,
            parent: request.parent,
            sprite: None,
            active: true,
            physics: None,
            fields: request.fields,
        };
        let actor = Actor::from_spec(&scene, &spec).map_err(|error| SceneError::Field {
            owner: format!("spawned actor '{}'", uid),
            error,
        })?;

        self.index.insert(uid.clone(), self.actors.len());
        self.actors.push(actor);
        Ok(uid)
    }

    /// Remove an actor from the live set. The removed copy (with
    /// `active = false`) is kept for the tick report.
    pub fn destroy(&mut self, uid: &str) -> bool {
        let Some(&i) = self.index.get(uid) else {
            return false;
        };
        let mut actor = self.actors.remove(i);
        actor.active = false;
        self.removed.push(actor);
        self.reindex();
        true
    }

    /// Drain actors removed since the last call
    pub fn take_removed(&mut self) -> Vec<Actor> {
        std::mem::take(&mut self.removed)
    }

    /// Set a field on an actor, validated against its type's schema
    pub fn set_actor_field(&mut self, uid: &str, name: &str, value: FieldValue) -> Result<(), SchemaError> {
        let scene = Arc::clone(&self.scene);
        let Some(actor) = self.actor_mut(uid) else {
            return Ok(());
        };
        let value = match scene.schema(&actor.actor_type) {
            Some(schema) => check_field(schema, name, &value)?,
            None => value,
        };
        actor.fields.insert(name.to_string(), value);
        Ok(())
    }

    pub fn role_field(&self, role: &str, name: &str) -> Option<&FieldValue> {
        self.roles.get(role).and_then(|f| f.get(name))
    }

    /// Update a server-owned role field. Unknown roles are ignored.
    pub fn set_role_field(&mut self, role: &str, name: &str, value: FieldValue) -> bool {
        match self.roles.get_mut(role) {
            Some(fields) => {
                fields.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn role_fields(&self, role: &str) -> Option<&Fields> {
        self.roles.get(role)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub(crate) fn begin_tick(&mut self) {
        self.tick += 1;
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn advance_turn(&mut self) {
        self.turn += 1;
    }

    pub fn gravity_enabled(&self) -> bool {
        self.gravity_enabled
    }

    pub fn set_gravity(&mut self, enabled: bool) {
        self.gravity_enabled = enabled;
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            turn: self.turn,
            gravity_enabled: self.gravity_enabled,
            globals: self.globals.clone(),
            roles: self.roles.clone(),
            actors: self.actors.clone(),
        }
    }
}
