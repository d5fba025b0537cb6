// Scene document model and validation
pub mod scene;

// Rule interpreter and live world state
pub mod interpreter;

// Parent/child attachment trees
pub mod attach;

// Tile sweeps, separation and collision queries
pub mod physics;

// Clip selection from body motion
pub mod animation;

// Fixed-step tick orchestration
pub mod runtime;

// Text-grid frames for agents
pub mod symbolic;

// Sessions, scheduling and tokens
pub mod session;

// Seed reservation and event log
pub mod store;

// Token extraction
pub mod auth;

// Static and runtime configuration
pub mod config;

// Session-level errors
pub mod error;

// HTTP and WebSocket APIs
pub mod api;
