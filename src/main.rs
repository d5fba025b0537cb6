use anyhow::{Context, Result};
use sceneloop::api::{create_app, AdminAppState, SessionAppState};
use sceneloop::config::{load_config, new_runtime_config, SceneloopConfig};
use sceneloop::interpreter::{register_builtins, ActionRegistry};
use sceneloop::scene::SceneSpec;
use sceneloop::session::{Game, SessionManager};
use sceneloop::store::SqliteStore;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sceneloop=info".into()),
        )
        .init();

    info!("Sceneloop starting...");

    let config_path =
        std::env::var("SCENELOOP_CONFIG").unwrap_or_else(|_| "sceneloop.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        load_config(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", config_path, e))?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        SceneloopConfig::default()
    };

    let runtime_config = new_runtime_config();
    info!(
        bind = %config.server.bind,
        scene = %config.scene.path,
        store = %config.store.path,
        "Configuration loaded"
    );

    let scene = SceneSpec::load(&config.scene.path)?;
    let mut registry = ActionRegistry::new();
    register_builtins(&mut registry);
    let game = Game::new(scene, registry).context("Scene rejected")?;
    info!(
        actors = game.scene.actors.len(),
        rules = game.scene.rules.len(),
        roles = game.scene.roles.len(),
        "Scene loaded"
    );

    let store = Arc::new(
        SqliteStore::new(&config.store.path).context("Failed to initialize session store")?,
    );

    let manager = Arc::new(SessionManager::new(
        game,
        store,
        config.sessions.clone(),
        Arc::clone(&runtime_config),
    ));

    let app = create_app(
        SessionAppState {
            manager,
            admin_token: config.server.admin_token.clone(),
        },
        AdminAppState {
            runtime_config,
            admin_token: config.server.admin_token.clone(),
        },
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "Session API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Session API server error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Sceneloop stopped");

    Ok(())
}
