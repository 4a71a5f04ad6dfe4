// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite persistence backend

use crate::sample::Sample;
use crate::store::{Mark, PersistenceGateway, SessionRecord};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite persistence store
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE measurements (
///     session_id TEXT NOT NULL,
///     timestamp INTEGER NOT NULL,
///     temp_val REAL NOT NULL,
///     PRIMARY KEY (session_id, timestamp)
/// );
/// CREATE TABLE sessions (
///     session_id TEXT NOT NULL,
///     session_name TEXT NOT NULL,
///     created_at INTEGER NOT NULL,
///     end_at INTEGER NOT NULL,
///     PRIMARY KEY (created_at, session_id)
/// );
/// CREATE TABLE session_marks (
///     session_id TEXT NOT NULL,
///     mark_name TEXT NOT NULL,
///     created_at INTEGER NOT NULL,
///     on_temp REAL NOT NULL,
///     PRIMARY KEY (session_id, created_at)
/// );
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a file-based database
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::info!("Opened session store at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to create in-memory SQLite database")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS measurements (
                session_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                temp_val REAL NOT NULL,
                PRIMARY KEY (session_id, timestamp)
            );
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT NOT NULL,
                session_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                end_at INTEGER NOT NULL,
                PRIMARY KEY (created_at, session_id)
            );
            CREATE TABLE IF NOT EXISTS session_marks (
                session_id TEXT NOT NULL,
                mark_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                on_temp REAL NOT NULL,
                PRIMARY KEY (session_id, created_at)
            );",
        )
        .context("Failed to create schema")?;

        Ok(())
    }
}

impl PersistenceGateway for SqliteStore {
    fn create_session(&self, id: &str, name: &str, created_at_ms: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (session_id, session_name, created_at, end_at)
             VALUES (?1, ?2, ?3, 0)",
            params![id, name, created_at_ms],
        )
        .with_context(|| format!("Failed to create session {}", id))?;
        Ok(())
    }

    fn end_session(&self, id: &str, ended_at_ms: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions SET end_at = ?1 WHERE session_id = ?2",
            params![ended_at_ms, id],
        )
        .with_context(|| format!("Failed to end session {}", id))?;
        Ok(())
    }

    fn delete_session(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sessions WHERE session_id = ?1", [id])?;
        tx.execute("DELETE FROM measurements WHERE session_id = ?1", [id])?;
        tx.execute("DELETE FROM session_marks WHERE session_id = ?1", [id])?;
        tx.commit()
            .with_context(|| format!("Failed to delete session {}", id))?;
        Ok(())
    }

    fn append_sample(&self, session_id: &str, sample: &Sample) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO measurements (session_id, timestamp, temp_val) VALUES (?1, ?2, ?3)",
            params![session_id, sample.timestamp_ms, sample.value],
        )
        .with_context(|| format!("Failed to insert sample for session {}", session_id))?;
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, session_name, created_at, end_at
             FROM sessions
             ORDER BY created_at ASC",
        )?;

        let sessions = stmt
            .query_map([], |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at_ms: row.get(2)?,
                    ended_at_ms: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    fn list_samples(&self, session_id: &str) -> Result<Vec<Sample>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, temp_val
             FROM measurements
             WHERE session_id = ?1
             ORDER BY timestamp ASC",
        )?;

        let samples = stmt
            .query_map([session_id], |row| Ok(Sample::new(row.get(1)?, row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    fn list_marks(&self, session_id: &str) -> Result<Vec<Mark>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT mark_name, created_at, on_temp
             FROM session_marks
             WHERE session_id = ?1
             ORDER BY created_at ASC",
        )?;

        // session_id is implied by the query
        let marks = stmt
            .query_map([session_id], |row| {
                Ok(Mark {
                    session_id: String::new(),
                    name: row.get(0)?,
                    created_at_ms: row.get(1)?,
                    temperature: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(marks)
    }

    fn record_mark(&self, mark: &Mark) -> Result<bool> {
        if mark.session_id.is_empty() {
            return Ok(false);
        }

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO session_marks (session_id, mark_name, created_at, on_temp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                mark.session_id,
                mark.name,
                mark.created_at_ms,
                mark.temperature
            ],
        )
        .with_context(|| format!("Failed to record mark for session {}", mark.session_id))?;

        Ok(true)
    }
}
