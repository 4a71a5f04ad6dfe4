// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Temperature samples and the shared "current value" cell.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One timestamped temperature reading.
///
/// Field names follow the viewer wire format (`temp`, `timestamp`, `unit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Temperature value
    #[serde(rename = "temp")]
    pub value: f64,

    /// Wall-clock time of ingestion (Unix milliseconds)
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,

    /// Unit label (e.g. "C"), if the sensor reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Sample {
    /// Create a sample without a unit.
    pub fn new(value: f64, timestamp_ms: i64) -> Self {
        Self {
            value,
            timestamp_ms,
            unit: None,
        }
    }

    /// Create a sample stamped with the current wall clock.
    pub fn now(value: f64) -> Self {
        Self::new(value, now_millis())
    }

    /// Attach a unit label.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Last sample seen by the ingest loop.
///
/// Single writer (the ingest loop), any number of readers.
#[derive(Debug, Default)]
pub struct CurrentValue {
    inner: RwLock<Option<Sample>>,
}

impl CurrentValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value.
    pub fn set(&self, sample: Sample) {
        *self.inner.write() = Some(sample);
    }

    /// Snapshot of the current value, if any sample has been ingested.
    pub fn get(&self) -> Option<Sample> {
        self.inner.read().clone()
    }
}
