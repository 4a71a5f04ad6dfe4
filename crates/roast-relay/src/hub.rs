// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broadcast hub - fans every sample out to all subscribed viewers.
//!
//! Each viewer owns a bounded outbound queue drained by its own writer task.
//! `publish` serializes a sample once and `try_send`s the frame into every
//! member queue: a full queue drops the new frame (drop-newest) and a closed
//! queue is logged. Neither removes the member; viewers leave through
//! [`BroadcastHub::unsubscribe`] when their read loop ends.

use crate::protocol::ServerMessage;
use crate::sample::Sample;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// A serialized JSON text frame shared by every recipient.
pub type Frame = Arc<str>;

/// Viewer connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerId(Uuid);

impl ViewerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ViewerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewerId {
    // short form for log prefixes
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = self.0.simple().to_string();
        f.write_str(&full[..8])
    }
}

/// Sending half of a viewer's outbound queue.
#[derive(Debug, Clone)]
pub struct ViewerHandle {
    id: ViewerId,
    tx: mpsc::Sender<Frame>,
}

impl ViewerHandle {
    /// Create a viewer queue with the given capacity.
    ///
    /// The receiver belongs to the viewer's writer task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ViewerId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Send a direct reply to this viewer, waiting for queue space.
    ///
    /// Returns false if the viewer's writer has gone away.
    pub async fn send(&self, msg: &ServerMessage) -> bool {
        match serde_json::to_string(msg) {
            Ok(json) => self.tx.send(Frame::from(json)).await.is_ok(),
            Err(e) => {
                error!("[{}] Failed to serialize message: {}", self.id, e);
                false
            }
        }
    }
}

/// Result of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

/// Hub statistics
#[derive(Debug, Default, Clone, Copy)]
pub struct HubStats {
    /// Frames queued to viewers
    pub frames_delivered: u64,
    /// Frames dropped (full or closed viewer queue)
    pub frames_dropped: u64,
    /// Currently subscribed viewers
    pub viewers: usize,
}

/// Live set of subscribed viewers.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    members: RwLock<HashMap<ViewerId, mpsc::Sender<Frame>>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a viewer. Idempotent; returns true if it was not yet a member.
    pub fn subscribe(&self, viewer: &ViewerHandle) -> bool {
        let mut members = self.members.write();
        let added = members.insert(viewer.id, viewer.tx.clone()).is_none();
        if added {
            debug!("[{}] Subscribed ({} viewers)", viewer.id, members.len());
        }
        added
    }

    /// Remove a viewer. Idempotent; returns true if it was a member.
    pub fn unsubscribe(&self, id: ViewerId) -> bool {
        let mut members = self.members.write();
        let removed = members.remove(&id).is_some();
        if removed {
            debug!("[{}] Unsubscribed ({} viewers)", id, members.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            frames_delivered: self.delivered.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            viewers: self.len(),
        }
    }

    /// Deliver a sample to every current member.
    pub fn publish(&self, sample: &Sample) -> PublishOutcome {
        self.broadcast(&ServerMessage::Temp(sample.clone()))
    }

    /// Serialize `msg` once and queue it for every current member.
    ///
    /// Never waits: members are snapshotted under the read lock, which is
    /// released before any send is attempted.
    pub fn broadcast(&self, msg: &ServerMessage) -> PublishOutcome {
        let frame: Frame = match serde_json::to_string(msg) {
            Ok(json) => Frame::from(json),
            Err(e) => {
                error!("Failed to serialize broadcast frame: {}", e);
                return PublishOutcome::default();
            }
        };

        let snapshot: Vec<(ViewerId, mpsc::Sender<Frame>)> = self
            .members
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut outcome = PublishOutcome::default();
        for (id, tx) in snapshot {
            match tx.try_send(Arc::clone(&frame)) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("[{}] Viewer queue full, dropping frame", id);
                    outcome.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("[{}] Viewer queue closed, frame not delivered", id);
                    outcome.dropped += 1;
                }
            }
        }

        self.delivered
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        self.dropped
            .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
        outcome
    }
}
