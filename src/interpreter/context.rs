use super::condition::{ButtonEvent, CollisionEvent, ToolCall};
use super::world::{Actor, SpawnRequest, World};
use crate::scene::{FieldValue, SceneError, SchemaError};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

/// What triggered an action invocation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Binding {
    /// Index of the rule in specification order
    pub rule: usize,
    pub tool: Option<ToolCall>,
    pub button: Option<ButtonEvent>,
    /// Oriented so that `a` matches the rule's first selector
    pub collision: Option<CollisionEvent>,
    /// Actor that satisfied a logical condition
    pub actor: Option<String>,
}

impl Binding {
    /// Role that caused the invocation (tool call or button press)
    pub fn role(&self) -> Option<&str> {
        self.tool
            .as_ref()
            .and_then(|t| t.role.as_deref())
            .or_else(|| self.button.as_ref().and_then(|b| b.role.as_deref()))
    }
}

/// Surface handed to action functions: globals, actor lookup, the trigger
/// binding and scene mutators.
pub struct ActionContext<'a> {
    world: &'a mut World,
    rng: &'a mut ChaCha8Rng,
    binding: &'a Binding,
    dt: f64,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(
        world: &'a mut World,
        rng: &'a mut ChaCha8Rng,
        binding: &'a Binding,
        dt: f64,
    ) -> Self {
        Self {
            world,
            rng,
            binding,
            dt,
        }
    }

    pub fn binding(&self) -> &Binding {
        self.binding
    }

    /// Arguments of the bound tool call (Null when not tool-triggered)
    pub fn tool_args(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.binding.tool.as_ref().map_or(&NULL, |t| &t.args)
    }

    pub fn collision(&self) -> Option<&CollisionEvent> {
        self.binding.collision.as_ref()
    }

    pub fn role(&self) -> Option<&str> {
        self.binding.role()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    pub fn world(&self) -> &World {
        self.world
    }

    pub fn global(&self, name: &str) -> Option<&FieldValue> {
        self.world.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.world.globals.insert(name.to_string(), value.into());
    }

    pub fn actor(&self, uid: &str) -> Option<&Actor> {
        self.world.actor(uid)
    }

    pub fn actor_mut(&mut self, uid: &str) -> Option<&mut Actor> {
        self.world.actor_mut(uid)
    }

    pub fn actors_of_type(&self, actor_type: &str) -> Vec<String> {
        self.world
            .actors_of_type(actor_type)
            .map(|a| a.uid.clone())
            .collect()
    }

    pub fn set_field(&mut self, uid: &str, name: &str, value: impl Into<FieldValue>) -> Result<(), SchemaError> {
        self.world.set_actor_field(uid, name, value.into())
    }

    pub fn role_field(&self, role: &str, name: &str) -> Option<&FieldValue> {
        self.world.role_field(role, name)
    }

    pub fn set_role_field(&mut self, role: &str, name: &str, value: impl Into<FieldValue>) -> bool {
        self.world.set_role_field(role, name, value.into())
    }

    pub fn spawn(&mut self, request: SpawnRequest) -> Result<String, SceneError> {
        self.world.spawn(request)
    }

    pub fn destroy(&mut self, uid: &str) -> bool {
        self.world.destroy(uid)
    }

    pub fn set_gravity(&mut self, enabled: bool) {
        self.world.set_gravity(enabled);
    }

    pub fn gravity_enabled(&self) -> bool {
        self.world.gravity_enabled()
    }

    pub fn turn(&self) -> u64 {
        self.world.turn()
    }

    /// Hand the turn to the next role
    pub fn advance_turn(&mut self) {
        self.world.advance_turn();
    }

    /// Session-seeded RNG; the only randomness actions may use
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        self.rng
    }
}
