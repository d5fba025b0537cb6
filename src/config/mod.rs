pub mod runtime;
pub use runtime::{new_runtime_config, RuntimeConfig, SharedRuntimeConfig};

use serde::Deserialize;

/// Complete sceneloop configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneloopConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Token for /api/admin/config (None disables the admin API)
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            admin_token: None,
        }
    }
}

/// Seed/event store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "sceneloop.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Scene document served by this process
#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    #[serde(default = "default_scene_path")]
    pub path: String,
}

fn default_scene_path() -> String {
    "scene.json".to_string()
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            path: default_scene_path(),
        }
    }
}

/// Session manager configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Random seeds tried before session creation gives up
    #[serde(default = "default_max_seed_attempts")]
    pub max_seed_attempts: u32,
    /// Lower bound on the state stream period
    #[serde(default = "default_stream_min_interval_ms")]
    pub stream_min_interval_ms: u64,
    /// Run a background clock for started sessions
    #[serde(default = "default_driver_enabled")]
    pub driver_enabled: bool,
}

fn default_max_seed_attempts() -> u32 {
    8
}

fn default_stream_min_interval_ms() -> u64 {
    50
}

fn default_driver_enabled() -> bool {
    true
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_seed_attempts: default_max_seed_attempts(),
            stream_min_interval_ms: default_stream_min_interval_ms(),
            driver_enabled: default_driver_enabled(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<SceneloopConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: SceneloopConfig = toml::from_str(&contents)?;
    Ok(config)
}
