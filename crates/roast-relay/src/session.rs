// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-active-session state machine.
//!
//! ```text
//!            start(name)
//!   Idle  ---------------->  Recording { id, name, created_at }
//!    ^                          |
//!    +--------------------------+
//!        stop() / abort(id)
//! ```
//!
//! At most one session is open at any instant. The durable session history
//! lives in the [`PersistenceGateway`](crate::store::PersistenceGateway);
//! this machine only answers "is a recording open, and which one".
//!
//! Samples are admitted for recording through [`SessionStateMachine::admit`],
//! which keeps every recorded timestamp inside `[created_at, ended_at)`.

use crate::error::{RelayError, Result};
use crate::sample::now_millis;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Identity of the open recording session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub id: String,
    pub name: String,
    /// Unix milliseconds
    pub created_at_ms: i64,
}

#[derive(Debug, Default)]
enum SessionState {
    #[default]
    Idle,
    Recording(ActiveSession),
}

/// Owns the single mutable session value.
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    state: RwLock<SessionState>,
    /// Newest timestamp admitted for the open session
    last_admitted_ms: AtomicI64,
    /// Held by a command across its transition and its durable write
    commands: Mutex<()>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session.
    ///
    /// Fails with [`RelayError::AlreadyActive`] without touching state if a
    /// session is already open. Check and transition happen under one write
    /// lock, so concurrent callers see exactly one winner.
    pub fn start(&self, name: &str) -> Result<ActiveSession> {
        let mut state = self.state.write();
        if let SessionState::Recording(current) = &*state {
            info!(
                "Rejecting start of '{}': session '{}' already active",
                name, current.name
            );
            return Err(RelayError::AlreadyActive);
        }

        let session = ActiveSession {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at_ms: now_millis(),
        };
        self.last_admitted_ms.store(session.created_at_ms, Ordering::SeqCst);
        *state = SessionState::Recording(session.clone());

        info!("Session started: {} '{}'", session.id, session.name);
        Ok(session)
    }

    /// Close the open session, returning it.
    ///
    /// Calling this while idle is a logged no-op.
    pub fn stop(&self) -> Option<ActiveSession> {
        self.close().map(|(session, _)| session)
    }

    /// Close the open session, returning it with its end time.
    ///
    /// The end time is later than every timestamp admitted for the session.
    pub fn close(&self) -> Option<(ActiveSession, i64)> {
        let mut state = self.state.write();
        match std::mem::take(&mut *state) {
            SessionState::Recording(session) => {
                let last = self.last_admitted_ms.load(Ordering::SeqCst);
                let ended_at = now_millis().max(last + 1);
                info!("Session stopped: {} '{}'", session.id, session.name);
                Some((session, ended_at))
            }
            SessionState::Idle => {
                debug!("Stop requested but no session is active");
                None
            }
        }
    }

    /// Decide whether a sample stamped `timestamp_ms` belongs to the open
    /// session; returns the session id if so.
    ///
    /// Samples stamped before the session started or later than the current
    /// clock are refused.
    pub fn admit(&self, timestamp_ms: i64) -> Option<String> {
        let state = self.state.read();
        let SessionState::Recording(session) = &*state else {
            return None;
        };
        if timestamp_ms < session.created_at_ms || timestamp_ms > now_millis() {
            return None;
        }
        // under the read lock so close() observes it
        self.last_admitted_ms.fetch_max(timestamp_ms, Ordering::SeqCst);
        Some(session.id.clone())
    }

    /// Serialize session commands.
    ///
    /// Held across a transition and the gateway write that records it, so
    /// no other command observes the gap between the two.
    pub async fn lock_commands(&self) -> MutexGuard<'_, ()> {
        self.commands.lock().await
    }

    /// Roll back a session whose durable record could not be created.
    ///
    /// Only clears state if `id` is still the open session; returns whether
    /// anything was cleared.
    pub fn abort(&self, id: &str) -> bool {
        let mut state = self.state.write();
        let matches = matches!(&*state, SessionState::Recording(s) if s.id == id);
        if matches {
            *state = SessionState::Idle;
            info!("Session {} rolled back", id);
        }
        matches
    }

    pub fn is_active(&self) -> bool {
        matches!(&*self.state.read(), SessionState::Recording(_))
    }

    /// Consistent snapshot of the open session.
    pub fn current(&self) -> Option<ActiveSession> {
        match &*self.state.read() {
            SessionState::Recording(session) => Some(session.clone()),
            SessionState::Idle => None,
        }
    }

    /// Id of the open session, or empty when idle.
    pub fn id(&self) -> String {
        self.current().map(|s| s.id).unwrap_or_default()
    }

    /// Name of the open session, or empty when idle.
    pub fn name(&self) -> String {
        self.current().map(|s| s.name).unwrap_or_default()
    }

    /// Creation time of the open session, or 0 when idle.
    pub fn created_at(&self) -> i64 {
        self.current().map(|s| s.created_at_ms).unwrap_or(0)
    }
}
