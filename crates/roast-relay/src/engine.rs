// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay engine - the ingest loop and the wiring around it.
//!
//! ```text
//! SampleSource --> ingest --+--> CurrentValue
//!                           +--> BroadcastHub ----> viewer queues
//!                           +--> SampleRecorder --> PersistenceGateway
//!                                (only while a session is open)
//! ```

use crate::config::RelayConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::{RelayError, Result};
use crate::history::SessionHistory;
use crate::hub::BroadcastHub;
use crate::recorder::{RecorderStats, SampleRecorder};
use crate::sample::{CurrentValue, Sample};
use crate::session::{ActiveSession, SessionStateMachine};
use crate::source::SampleSource;
use crate::store::{self, SharedGateway};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Top-level orchestrator.
///
/// Share it behind an `Arc`: the ingest loop, every viewer connection and
/// the administrative handlers all hold the same engine.
pub struct RelayEngine {
    config: RelayConfig,
    session: Arc<SessionStateMachine>,
    hub: Arc<BroadcastHub>,
    current: Arc<CurrentValue>,
    store: SharedGateway,
    recorder: SampleRecorder,
    _recorder_worker: JoinHandle<()>,
}

impl RelayEngine {
    /// Create an engine. Must be called within a Tokio runtime.
    pub fn new(config: RelayConfig, store: SharedGateway) -> Result<Self> {
        config.validate()?;

        let (recorder, worker) =
            SampleRecorder::spawn(Arc::clone(&store), config.recorder_queue_capacity);

        Ok(Self {
            config,
            session: Arc::new(SessionStateMachine::new()),
            hub: Arc::new(BroadcastHub::new()),
            current: Arc::new(CurrentValue::new()),
            store,
            recorder,
            _recorder_worker: worker,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStateMachine> {
        &self.session
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn store(&self) -> &SharedGateway {
        &self.store
    }

    /// Last ingested sample.
    pub fn current(&self) -> Option<Sample> {
        self.current.get()
    }

    pub fn recorder_stats(&self) -> RecorderStats {
        self.recorder.stats()
    }

    /// Command dispatcher bound to this engine's session and store.
    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(Arc::clone(&self.session), Arc::clone(&self.store))
    }

    /// History queries bound to this engine's session and store.
    pub fn history(&self) -> SessionHistory {
        SessionHistory::new(Arc::clone(&self.session), Arc::clone(&self.store))
    }

    /// Process one sample: update the current value, fan out, and queue it
    /// for recording when a session covers its timestamp.
    ///
    /// Never waits on viewers or storage.
    pub fn ingest(&self, mut sample: Sample) {
        if sample.unit.is_none() {
            sample.unit = self.config.sample_unit.clone();
        }

        self.current.set(sample.clone());

        let outcome = self.hub.publish(&sample);
        if outcome.dropped > 0 {
            debug!(
                "Sample {} reached {} viewers, {} dropped",
                sample.timestamp_ms, outcome.delivered, outcome.dropped
            );
        }

        if let Some(session_id) = self.session.admit(sample.timestamp_ms) {
            self.recorder.enqueue(&session_id, sample);
        }
    }

    /// Drive the ingest loop until the source ends.
    ///
    /// Returns the number of samples ingested when the source ends cleanly,
    /// or the source's terminal error. There is no reconnect.
    pub async fn run<S: SampleSource>(&self, source: S) -> Result<u64> {
        self.run_until(source, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but also stops when `shutdown` resolves.
    ///
    /// The source is closed on every exit path.
    pub async fn run_until<S, F>(&self, mut source: S, shutdown: F) -> Result<u64>
    where
        S: SampleSource,
        F: Future<Output = ()> + Send,
    {
        info!("Ingest loop started ({})", source.describe());
        tokio::pin!(shutdown);
        let mut ingested = 0u64;

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Ingest loop stopped after {} samples", ingested);
                    break Ok(ingested);
                }
                next = source.next_sample() => match next {
                    Ok(Some(sample)) => {
                        self.ingest(sample);
                        ingested += 1;
                    }
                    Ok(None) => {
                        info!("Source {} ended after {} samples", source.describe(), ingested);
                        break Ok(ingested);
                    }
                    Err(e @ RelayError::UpstreamDisconnected(_)) => {
                        error!("Source {} failed: {}", source.describe(), e);
                        break Err(e);
                    }
                    Err(other) => {
                        error!("Source {} failed: {}", source.describe(), other);
                        break Err(RelayError::UpstreamDisconnected(other.to_string()));
                    }
                },
            }
        };

        source.close().await;
        result
    }

    /// Wait until every sample queued for recording has been written.
    pub async fn flush(&self) {
        self.recorder.flush().await;
    }

    /// Close the open session durably, if any.
    ///
    /// Recording stops first, then queued samples are flushed, then the end
    /// time is written.
    pub async fn shutdown(&self) -> Option<ActiveSession> {
        let _commands = self.session.lock_commands().await;
        let (session, ended_at) = self.session.close()?;
        self.flush().await;

        let id = session.id.clone();
        match store::call(&self.store, move |s| s.end_session(&id, ended_at)).await {
            Ok(()) => info!("Session {} '{}' closed on shutdown", session.id, session.name),
            Err(e) => warn!("Could not close session {} on shutdown: {}", session.id, e),
        }
        Some(session)
    }
}
