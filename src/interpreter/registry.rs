use super::context::ActionContext;
use super::world::{Actor, World};
use crate::scene::{Condition, SceneError, SceneSpec};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of one step of a multi-tick action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Done,
}

/// Resumable computation registered by an action. Advanced exactly once per
/// tick before rules are evaluated.
pub trait MultiTickAction: Send {
    fn advance(&mut self, ctx: &mut ActionContext<'_>) -> Result<Progress>;
}

impl<F> MultiTickAction for F
where
    F: FnMut(&mut ActionContext<'_>) -> Result<Progress> + Send,
{
    fn advance(&mut self, ctx: &mut ActionContext<'_>) -> Result<Progress> {
        self(ctx)
    }
}

/// What an action invocation produced
pub enum ActionOutcome {
    Done,
    Continue(Box<dyn MultiTickAction>),
}

impl ActionOutcome {
    pub fn resume<F>(step: F) -> Self
    where
        F: FnMut(&mut ActionContext<'_>) -> Result<Progress> + Send + 'static,
    {
        ActionOutcome::Continue(Box::new(step))
    }
}

pub type ActionFn = Arc<dyn Fn(&mut ActionContext<'_>) -> Result<ActionOutcome> + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&Actor, &World) -> bool + Send + Sync>;

/// Externally supplied state-mutation functions, looked up by name
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionFn>,
    predicates: HashMap<String, PredicateFn>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_action<F>(&mut self, name: &str, action: F) -> &mut Self
    where
        F: Fn(&mut ActionContext<'_>) -> Result<ActionOutcome> + Send + Sync + 'static,
    {
        self.actions.insert(name.to_string(), Arc::new(action));
        self
    }

    pub fn register_predicate<F>(&mut self, name: &str, predicate: F) -> &mut Self
    where
        F: Fn(&Actor, &World) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.to_string(), Arc::new(predicate));
        self
    }

    pub fn action(&self, name: &str) -> Option<&ActionFn> {
        self.actions.get(name)
    }

    pub fn predicate(&self, name: &str) -> Option<&PredicateFn> {
        self.predicates.get(name)
    }

    /// Check that every rule of `scene` resolves to a registered function
    pub fn validate_scene(&self, scene: &SceneSpec) -> Result<(), SceneError> {
        for (idx, rule) in scene.rules.iter().enumerate() {
            if !self.actions.contains_key(&rule.action) {
                return Err(SceneError::MissingFunction(format!(
                    "rule {} uses unregistered action '{}'",
                    idx, rule.action
                )));
            }
            if let Condition::Logical { predicate, .. } = &rule.condition {
                if !self.predicates.contains_key(predicate) {
                    return Err(SceneError::MissingFunction(format!(
                        "rule {} uses unregistered predicate '{}'",
                        idx, predicate
                    )));
                }
            }
        }
        Ok(())
    }
}
