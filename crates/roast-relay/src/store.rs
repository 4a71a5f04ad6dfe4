// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistence gateway abstraction
//!
//! Defines the trait the relay core records sessions, samples and marks
//! through. The core never reads its own writes back for correctness; the
//! query methods only serve `get` and the administrative surface.

use crate::error::RelayError;
use crate::sample::Sample;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A session as stored in the durable history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,

    /// Start time (Unix milliseconds)
    #[serde(rename = "create_at")]
    pub created_at_ms: i64,

    /// End time (Unix milliseconds, 0 = not ended)
    #[serde(rename = "end_at")]
    pub ended_at_ms: i64,
}

impl SessionRecord {
    pub fn is_ended(&self) -> bool {
        self.ended_at_ms != 0
    }
}

/// An operator-entered event tied to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    /// Owning session (omitted on the wire when empty)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,

    #[serde(rename = "mark_name")]
    pub name: String,

    /// Unix milliseconds
    #[serde(rename = "create_at")]
    pub created_at_ms: i64,

    /// Temperature when the mark was taken
    #[serde(rename = "on_temp")]
    pub temperature: f64,
}

/// Persistence gateway trait
///
/// Backend-agnostic interface for the durable session history.
/// Implementations must be safe for concurrent calls.
///
/// # Implementations
///
/// - `SqliteStore` -- Default, bundled SQLite
pub trait PersistenceGateway: Send + Sync {
    /// Record the start of a session
    fn create_session(&self, id: &str, name: &str, created_at_ms: i64) -> Result<()>;

    /// Record the end time of a session
    fn end_session(&self, id: &str, ended_at_ms: i64) -> Result<()>;

    /// Delete a session together with its samples and marks
    fn delete_session(&self, id: &str) -> Result<()>;

    /// Append one sample to a session
    fn append_sample(&self, session_id: &str, sample: &Sample) -> Result<()>;

    /// List every stored session
    fn list_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// Samples of a session, ordered by timestamp ascending
    fn list_samples(&self, session_id: &str) -> Result<Vec<Sample>>;

    /// Marks of a session
    fn list_marks(&self, session_id: &str) -> Result<Vec<Mark>>;

    /// Persist a mark.
    ///
    /// Returns `Ok(false)` without writing when `mark.session_id` is empty.
    fn record_mark(&self, mark: &Mark) -> Result<bool>;
}

/// Shared handle to a gateway implementation.
pub type SharedGateway = Arc<dyn PersistenceGateway>;

/// Run a gateway call on the blocking pool.
///
/// Storage I/O never runs on an async worker thread; failures come back as
/// [`RelayError::Persistence`].
pub async fn call<T, F>(store: &SharedGateway, f: F) -> crate::error::Result<T>
where
    F: FnOnce(&dyn PersistenceGateway) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| RelayError::Persistence(format!("storage task failed: {}", e)))?
        .map_err(RelayError::from)
}
