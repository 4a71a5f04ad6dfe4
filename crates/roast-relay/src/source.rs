// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Upstream sample sources.
//!
//! A source yields a lazy sequence of samples. It is consumed once by the
//! ingest loop and is not restartable.

use crate::error::{RelayError, Result};
use crate::sample::Sample;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Producer of the live sample sequence.
#[async_trait]
pub trait SampleSource: Send {
    /// Wait for the next sample.
    ///
    /// `Ok(None)` means the source ended cleanly; an error is terminal.
    async fn next_sample(&mut self) -> Result<Option<Sample>>;

    /// Release the upstream link.
    async fn close(&mut self) {}

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Source fed through an in-process channel.
pub struct ChannelSource {
    rx: mpsc::Receiver<Sample>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<Sample>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl SampleSource for ChannelSource {
    async fn next_sample(&mut self) -> Result<Option<Sample>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) {
        self.rx.close();
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}

/// Synthetic roast curve for running without a sensor.
///
/// Emits `100 * cos(x) + 30 + noise` with `x` advancing by 0.1 per tick and
/// noise uniform in `[0, 10)`.
pub struct SimulatedSource {
    ticker: Option<Interval>,
    period: Duration,
    phase: f64,
    unit: Option<String>,
    remaining: Option<u64>,
}

impl SimulatedSource {
    pub fn new(period: Duration) -> Self {
        Self {
            ticker: None,
            period,
            phase: 0.0,
            unit: None,
            remaining: None,
        }
    }

    /// Label every sample with a unit.
    pub fn with_unit(mut self, unit: Option<String>) -> Self {
        self.unit = unit;
        self
    }

    /// End the sequence after `count` samples.
    pub fn limit(mut self, count: u64) -> Self {
        self.remaining = Some(count);
        self
    }

    fn next_value(&mut self) -> f64 {
        self.phase += 0.1;
        100.0 * self.phase.cos() + 30.0 + fastrand::f64() * 10.0
    }
}

#[async_trait]
impl SampleSource for SimulatedSource {
    async fn next_sample(&mut self) -> Result<Option<Sample>> {
        match self.remaining {
            Some(0) => return Ok(None),
            Some(ref mut n) => *n -= 1,
            None => {}
        }

        let period = self.period;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        ticker.tick().await;
        let mut sample = Sample::now(self.next_value());
        sample.unit = self.unit.clone();
        tracing::trace!("Simulated sample {:.2}", sample.value);
        Ok(Some(sample))
    }

    fn describe(&self) -> String {
        format!("simulated ({} ms)", self.period.as_millis())
    }
}

/// Source that fails immediately (tests, unreachable sensors).
pub struct FailedSource {
    reason: String,
}

impl FailedSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SampleSource for FailedSource {
    async fn next_sample(&mut self) -> Result<Option<Sample>> {
        Err(RelayError::UpstreamDisconnected(self.reason.clone()))
    }

    fn describe(&self) -> String {
        format!("failed ({})", self.reason)
    }
}
