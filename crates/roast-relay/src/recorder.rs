// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample recorder
//!
//! Decouples the ingest loop from storage I/O: samples are queued on a
//! bounded channel and written by a single worker on the blocking pool.
//! A single worker keeps per-session write order equal to ingestion order.
//!
//! # Operation
//!
//! 1. Ingest loop calls [`SampleRecorder::enqueue`] (never waits)
//! 2. Worker appends each sample through the gateway
//! 3. Failed appends are logged and dropped; samples are never resent

use crate::sample::Sample;
use crate::store::SharedGateway;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

enum RecorderJob {
    Append { session_id: String, sample: Sample },
    Flush(oneshot::Sender<()>),
}

/// Recorder statistics
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderStats {
    /// Samples accepted into the queue
    pub samples_queued: u64,
    /// Samples written to storage
    pub samples_stored: u64,
    /// Samples dropped because the queue was full
    pub samples_dropped: u64,
    /// Storage errors
    pub storage_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    stored: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
}

/// Handle to the persistence worker.
#[derive(Clone)]
pub struct SampleRecorder {
    tx: mpsc::Sender<RecorderJob>,
    counters: Arc<Counters>,
}

impl SampleRecorder {
    /// Spawn the worker. Must be called within a Tokio runtime.
    ///
    /// The worker exits once every `SampleRecorder` clone is dropped.
    pub fn spawn(store: SharedGateway, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<RecorderJob>(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let worker = tokio::task::spawn_blocking(move || {
            tracing::debug!("Sample recorder started");
            while let Some(job) = rx.blocking_recv() {
                match job {
                    RecorderJob::Append { session_id, sample } => {
                        match store.append_sample(&session_id, &sample) {
                            Ok(()) => {
                                worker_counters.stored.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                worker_counters.errors.fetch_add(1, Ordering::Relaxed);
                                tracing::error!(
                                    "Failed to store sample for session {}: {:#}",
                                    session_id,
                                    e
                                );
                            }
                        }
                    }
                    RecorderJob::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("Sample recorder stopped");
        });

        (Self { tx, counters }, worker)
    }

    /// Queue a sample for `session_id` without waiting.
    ///
    /// Returns false if the sample was dropped.
    pub fn enqueue(&self, session_id: &str, sample: Sample) -> bool {
        let job = RecorderJob::Append {
            session_id: session_id.to_string(),
            sample,
        };
        match self.tx.try_send(job) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Recorder queue full, dropping sample for {}", session_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Recorder worker gone, dropping sample for {}", session_id);
                false
            }
        }
    }

    /// Wait until every sample queued before this call has been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(RecorderJob::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            samples_queued: self.counters.queued.load(Ordering::Relaxed),
            samples_stored: self.counters.stored.load(Ordering::Relaxed),
            samples_dropped: self.counters.dropped.load(Ordering::Relaxed),
            storage_errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}
