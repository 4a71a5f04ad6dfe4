// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session history queries for the administrative surface.

use crate::error::Result;
use crate::sample::Sample;
use crate::session::SessionStateMachine;
use crate::store::{self, Mark, SessionRecord, SharedGateway};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Samples and marks of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDetail {
    pub temps: Vec<Sample>,
    pub marks: Vec<Mark>,
}

/// Outcome of a delete request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub status: bool,
    pub msg: String,
}

/// Read/delete access to recorded sessions and mark entry.
#[derive(Clone)]
pub struct SessionHistory {
    session: Arc<SessionStateMachine>,
    store: SharedGateway,
}

impl SessionHistory {
    pub fn new(session: Arc<SessionStateMachine>, store: SharedGateway) -> Self {
        Self { session, store }
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        store::call(&self.store, |s| s.list_sessions()).await
    }

    pub async fn session_detail(&self, id: &str) -> Result<SessionDetail> {
        let id = id.to_string();
        let (temps, marks) =
            store::call(&self.store, move |s| Ok((s.list_samples(&id)?, s.list_marks(&id)?)))
                .await?;
        Ok(SessionDetail { temps, marks })
    }

    /// Delete a session with its samples and marks.
    ///
    /// The session currently being recorded cannot be deleted.
    pub async fn delete_session(&self, id: &str) -> DeleteOutcome {
        let _commands = self.session.lock_commands().await;
        if self.session.current().is_some_and(|s| s.id == id) {
            warn!("Refusing to delete active session {}", id);
            return DeleteOutcome {
                status: false,
                msg: format!("session {} is being recorded", id),
            };
        }

        let target = id.to_string();
        match store::call(&self.store, move |s| s.delete_session(&target)).await {
            Ok(()) => {
                info!("Session {} deleted", id);
                DeleteOutcome {
                    status: true,
                    msg: "session deleted".to_string(),
                }
            }
            Err(e) => {
                warn!("Could not delete session {}: {}", id, e);
                DeleteOutcome {
                    status: false,
                    msg: format!("could not delete session {}", id),
                }
            }
        }
    }

    /// Record an operator mark.
    ///
    /// A mark without a session id is dropped without a write; returns
    /// whether the mark was stored.
    pub async fn record_mark(&self, mark: Mark) -> Result<bool> {
        if mark.session_id.is_empty() {
            debug!("Ignoring mark '{}' without session", mark.name);
            return Ok(false);
        }
        debug!("Mark '{}' at {:.1} for {}", mark.name, mark.temperature, mark.session_id);
        store::call(&self.store, move |s| s.record_mark(&mark)).await
    }
}
