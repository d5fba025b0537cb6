//! Generic actions any scene may reference without host code.

use super::registry::{ActionOutcome, ActionRegistry};
use anyhow::{anyhow, Result};

/// Register the built-in action library
pub fn register_builtins(registry: &mut ActionRegistry) {
    registry
        .register_action("advance_turn", |ctx| {
            ctx.advance_turn();
            Ok(ActionOutcome::Done)
        })
        .register_action("destroy_other", |ctx| {
            let other = ctx
                .collision()
                .map(|c| c.b.uid.clone())
                .ok_or_else(|| anyhow!("destroy_other needs a collision binding"))?;
            ctx.destroy(&other);
            Ok(ActionOutcome::Done)
        })
        .register_action("toggle_gravity", |ctx| {
            let enabled = ctx.gravity_enabled();
            ctx.set_gravity(!enabled);
            Ok(ActionOutcome::Done)
        })
        .register_action("apply_tool_velocity", apply_tool_velocity);
}

/// Tool args `{uid, vx?, vy?}`: set the actor's velocity
fn apply_tool_velocity(ctx: &mut super::ActionContext<'_>) -> Result<ActionOutcome> {
    let args = ctx.tool_args().clone();
    let uid = args
        .get("uid")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("apply_tool_velocity needs a 'uid' argument"))?;
    let vx = args.get("vx").and_then(|v| v.as_f64());
    let vy = args.get("vy").and_then(|v| v.as_f64());

    let actor = ctx
        .actor_mut(uid)
        .ok_or_else(|| anyhow!("no actor '{}'", uid))?;
    if let Some(vx) = vx {
        actor.vx = vx;
    }
    if let Some(vy) = vy {
        actor.vy = vy;
    }
    Ok(ActionOutcome::Done)
}
