use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Runtime-configurable limits. Changes via PUT /api/admin/config take effect immediately
/// without restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub max_sessions: usize,
    pub max_commands_per_request: usize,
    pub max_queue_per_role: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            max_commands_per_request: 64,
            max_queue_per_role: 256,
        }
    }
}

impl RuntimeConfig {
    /// Build from env vars, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SCENELOOP_MAX_SESSIONS") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.max_sessions = n;
            }
        }
        if let Ok(v) = std::env::var("SCENELOOP_MAX_COMMANDS_PER_REQUEST") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.max_commands_per_request = n;
            }
        }
        if let Ok(v) = std::env::var("SCENELOOP_MAX_QUEUE_PER_ROLE") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.max_queue_per_role = n;
            }
        }

        cfg
    }
}

pub type SharedRuntimeConfig = Arc<RwLock<RuntimeConfig>>;

pub fn new_runtime_config() -> SharedRuntimeConfig {
    Arc::new(RwLock::new(RuntimeConfig::from_env()))
}
