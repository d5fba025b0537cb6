//! SQLite implementation of the event store.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use std::sync::Mutex;
use tracing::info;

use super::{EventStore, StoreError, StoredEvent};

/// Seeds and session events in one SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database and ensures the tables exist.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open session store at {}", db_path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        info!(path = %db_path, "Session store opened");
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS seeds (
                seed       TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                metadata   TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events (
                session_id TEXT NOT NULL,
                seq        INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                payload    TEXT NOT NULL,
                tick       INTEGER,
                created_at TEXT NOT NULL,
                PRIMARY KEY (session_id, seq)
            );",
        )
        .context("Failed to create store tables")?;
        Ok(())
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

impl EventStore for SqliteStore {
    fn reserve(&self, session_id: &str, seed: &str, metadata: &Value) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO seeds (seed, session_id, metadata, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![seed, session_id, metadata.to_string(), Utc::now().to_rfc3339()],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(StoreError::DuplicateSeed(seed.to_string())),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to reserve seed").into()),
        }
    }

    fn has(&self, seed: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM seeds WHERE seed = ?1", params![seed], |row| row.get(0))
            .optional()
            .context("Failed to look up seed")?;
        Ok(found.is_some())
    }

    fn append_event(
        &self,
        session_id: &str,
        event_type: &str,
        payload: &Value,
        tick: Option<u64>,
    ) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let next: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .context("Failed to compute next event sequence")?;
        conn.execute(
            "INSERT INTO events (session_id, seq, event_type, payload, tick, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                next,
                event_type,
                payload.to_string(),
                tick.map(|t| t as i64),
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to append event")?;
        Ok(next as u64)
    }

    fn events(&self, session_id: &str) -> Result<Vec<StoredEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT seq, event_type, payload, tick, created_at FROM events
                 WHERE session_id = ?1 ORDER BY seq ASC",
            )
            .context("Failed to prepare events query")?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                let seq: i64 = row.get(0)?;
                let event_type: String = row.get(1)?;
                let payload: String = row.get(2)?;
                let tick: Option<i64> = row.get(3)?;
                let created_at: String = row.get(4)?;
                Ok((seq, event_type, payload, tick, created_at))
            })
            .context("Failed to query events")?;

        let mut events = Vec::new();
        for row in rows {
            let (seq, event_type, payload, tick, created_at) = row.context("Failed to read event row")?;
            let payload: Value = serde_json::from_str(&payload)
                .with_context(|| format!("Failed to parse payload of event {}", seq))?;
            let created_at = created_at
                .parse()
                .with_context(|| format!("Failed to parse created_at of event {}", seq))?;
            events.push(StoredEvent {
                session_id: session_id.to_string(),
                seq: seq as u64,
                event_type,
                payload,
                tick: tick.map(|t| t as u64),
                created_at,
            });
        }
        Ok(events)
    }
}
