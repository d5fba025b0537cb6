use super::{build_fields, SceneSpec, SchemaError};
use std::collections::HashSet;

/// Scene validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum SceneError {
    /// Two actors share a uid
    DuplicateUid(String),
    /// Actor type has neither a template nor a schema
    UnknownActorType { uid: String, actor_type: String },
    /// Actor or global field failed schema validation
    Field { owner: String, error: SchemaError },
    /// Tile grid does not match declared dimensions
    MapShape(String),
    /// Tile id used in the grid has no definition
    UnknownTile(u32),
    /// Camera, parent, role or follow target reference does not resolve
    UnknownReference(String),
    /// Two roles share an id
    DuplicateRole(String),
    /// Multiplayer block is unusable
    InvalidMultiplayer(String),
    /// Rule references an unregistered action, predicate or undeclared tool
    MissingFunction(String),
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneError::DuplicateUid(uid) => write!(f, "duplicate actor uid '{}'", uid),
            SceneError::UnknownActorType { uid, actor_type } => write!(
                f,
                "actor '{}' has unknown type '{}' (no template or schema)",
                uid, actor_type
            ),
            SceneError::Field { owner, error } => write!(f, "{}: {}", owner, error),
            SceneError::MapShape(msg) => write!(f, "map shape: {}", msg),
            SceneError::UnknownTile(id) => write!(f, "tile id {} has no definition", id),
            SceneError::UnknownReference(msg) => write!(f, "unknown reference: {}", msg),
            SceneError::DuplicateRole(id) => write!(f, "duplicate role '{}'", id),
            SceneError::InvalidMultiplayer(msg) => write!(f, "multiplayer: {}", msg),
            SceneError::MissingFunction(msg) => write!(f, "missing function: {}", msg),
        }
    }
}

impl std::error::Error for SceneError {}

/// Validate the structural invariants of a scene document.
///
/// Registry references (actions, predicates) are checked separately when the
/// scene is paired with its function registry.
pub fn validate_scene(scene: &SceneSpec) -> Result<(), SceneError> {
    validate_actors(scene)?;
    validate_map(scene)?;
    validate_roles(scene)?;
    validate_multiplayer(scene)?;

    for camera in &scene.cameras {
        if let Some(follow) = &camera.follow {
            if !scene.actors.iter().any(|a| &a.uid == follow) {
                return Err(SceneError::UnknownReference(format!(
                    "camera '{}' follows missing actor '{}'",
                    camera.id, follow
                )));
            }
        }
    }

    for rule in &scene.rules {
        if let super::Condition::Tool { name, .. } = &rule.condition {
            if scene.tool(name).is_none() {
                return Err(SceneError::MissingFunction(format!(
                    "rule for action '{}' listens to undeclared tool '{}'",
                    rule.action, name
                )));
            }
        }
    }

    Ok(())
}

fn validate_actors(scene: &SceneSpec) -> Result<(), SceneError> {
    let mut seen = HashSet::new();
    for actor in &scene.actors {
        if !seen.insert(actor.uid.as_str()) {
            return Err(SceneError::DuplicateUid(actor.uid.clone()));
        }

        let template = scene.template(&actor.actor_type);
        let schema = scene.schema(&actor.actor_type);
        if template.is_none() && schema.is_none() {
            return Err(SceneError::UnknownActorType {
                uid: actor.uid.clone(),
                actor_type: actor.actor_type.clone(),
            });
        }

        let defaults = template.map(|t| t.fields.clone()).unwrap_or_default();
        build_fields(schema, &defaults, &actor.fields).map_err(|error| SceneError::Field {
            owner: format!("actor '{}'", actor.uid),
            error,
        })?;
    }

    for actor in &scene.actors {
        if let Some(parent) = &actor.parent {
            if !seen.contains(parent.as_str()) {
                return Err(SceneError::UnknownReference(format!(
                    "actor '{}' attached to missing parent '{}'",
                    actor.uid, parent
                )));
            }
        }
    }

    Ok(())
}

fn validate_map(scene: &SceneSpec) -> Result<(), SceneError> {
    let Some(map) = &scene.map else {
        return Ok(());
    };

    if map.tile_size <= 0.0 {
        return Err(SceneError::MapShape("tile_size must be positive".to_string()));
    }
    if map.tiles.len() != map.height {
        return Err(SceneError::MapShape(format!(
            "expected {} rows, found {}",
            map.height,
            map.tiles.len()
        )));
    }
    for (row_idx, row) in map.tiles.iter().enumerate() {
        if row.len() != map.width {
            return Err(SceneError::MapShape(format!(
                "row {} has {} columns, expected {}",
                row_idx,
                row.len(),
                map.width
            )));
        }
        for id in row {
            if *id != 0 && map.def(*id).is_none() {
                return Err(SceneError::UnknownTile(*id));
            }
        }
    }

    Ok(())
}

fn validate_roles(scene: &SceneSpec) -> Result<(), SceneError> {
    let mut seen = HashSet::new();
    for role in &scene.roles {
        if !seen.insert(role.id.as_str()) {
            return Err(SceneError::DuplicateRole(role.id.clone()));
        }
        if let Some(camera) = &role.camera {
            if scene.camera(camera).is_none() {
                return Err(SceneError::UnknownReference(format!(
                    "role '{}' bound to missing camera '{}'",
                    role.id, camera
                )));
            }
        }
    }

    for tool in &scene.tools {
        if let Some(roles) = &tool.roles {
            if let Some(missing) = roles.iter().find(|r| !seen.contains(r.as_str())) {
                return Err(SceneError::UnknownReference(format!(
                    "tool '{}' offered to missing role '{}'",
                    tool.name, missing
                )));
            }
        }
    }

    Ok(())
}

fn validate_multiplayer(scene: &SceneSpec) -> Result<(), SceneError> {
    let mp = &scene.multiplayer;
    if mp.tick_rate == 0 {
        return Err(SceneError::InvalidMultiplayer(
            "tick_rate must be positive".to_string(),
        ));
    }
    if !(mp.game_time_scale > 0.0) {
        return Err(SceneError::InvalidMultiplayer(
            "game_time_scale must be positive".to_string(),
        ));
    }
    if mp.max_catchup_steps == 0 {
        return Err(SceneError::InvalidMultiplayer(
            "max_catchup_steps must be at least 1".to_string(),
        ));
    }
    Ok(())
}
