//! Durable seed and event store.
//!
//! Sessions reserve their seed here before they exist and append lifecycle
//! and tick events as they run. The contract is deliberately narrow so other
//! backends can be swapped in behind `Arc<dyn EventStore>`.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// One appended session event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    pub session_id: String,
    /// Per-session sequence number, starting at 1
    pub seq: u64,
    pub event_type: String,
    pub payload: Value,
    pub tick: Option<u64>,
    pub created_at: DateTime<Utc>,
}

pub trait EventStore: Send + Sync {
    /// Reserve `seed` for `session_id`. Fails with `DuplicateSeed` if the
    /// seed was reserved before; nothing is written in that case.
    fn reserve(&self, session_id: &str, seed: &str, metadata: &Value) -> Result<(), StoreError>;

    fn has(&self, seed: &str) -> Result<bool, StoreError>;

    /// Append an event and return its sequence number
    fn append_event(
        &self,
        session_id: &str,
        event_type: &str,
        payload: &Value,
        tick: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Events of a session in sequence order
    fn events(&self, session_id: &str) -> Result<Vec<StoredEvent>, StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    DuplicateSeed(String),
    Backend(anyhow::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateSeed(seed) => write!(f, "Seed '{}' is already reserved", seed),
            StoreError::Backend(e) => write!(f, "Store error: {:#}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Backend(e)
    }
}
