//! Checkpoint persistence
//!
//! One row per session holding the JSON snapshot plus the columns needed to
//! list sessions without decoding every snapshot.

mod memory;
mod schema;

pub use memory::MemoryStore;
pub use schema::*;

use crate::state_machine::Status;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Corrupt checkpoint for session {session_id}: {reason}")]
    Corrupt { session_id: String, reason: String },
    #[error("Checkpoint store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Checkpoint Operations ====================

    /// Insert or replace the checkpoint for `conversation.session_id`.
    ///
    /// `created_at` of an existing row is preserved.
    pub fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        let snapshot = Snapshot::encode(conversation)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO checkpoints (session_id, format_version, status, message_count, snapshot, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(session_id) DO UPDATE SET
                format_version = excluded.format_version,
                status = excluded.status,
                message_count = excluded.message_count,
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at",
            params![
                conversation.session_id,
                FORMAT_VERSION,
                conversation.status().as_str(),
                i64::try_from(conversation.transcript.len()).unwrap_or(i64::MAX),
                snapshot,
                conversation.created_at.to_rfc3339(),
                conversation.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load a checkpoint; `None` when the session was never saved
    pub fn load(&self, session_id: &str) -> StoreResult<Option<Conversation>> {
        let conn = self.conn()?;
        let snapshot: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM checkpoints WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        snapshot
            .map(|json| {
                Snapshot::decode(&json).map_err(|reason| StoreError::Corrupt {
                    session_id: session_id.to_string(),
                    reason,
                })
            })
            .transpose()
    }

    /// Delete a checkpoint; returns whether one existed
    pub fn delete(&self, session_id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM checkpoints WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(deleted > 0)
    }

    /// All sessions, most recently updated first
    pub fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, status, message_count, updated_at
             FROM checkpoints
             ORDER BY updated_at DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            let status: String = row.get(1)?;
            let count: i64 = row.get(2)?;
            Ok(SessionSummary {
                session_id: row.get(0)?,
                status: parse_status(&status),
                message_count: usize::try_from(count).unwrap_or(0),
                updated_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

fn parse_status(s: &str) -> Status {
    match s {
        "running" => Status::Running,
        "suspended" => Status::Suspended,
        "completed" => Status::Completed,
        _ => Status::Idle,
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
