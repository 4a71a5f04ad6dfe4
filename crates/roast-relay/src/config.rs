// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Outbound frames buffered per viewer before new frames are dropped
    pub viewer_queue_capacity: usize,

    /// Samples buffered for the persistence worker before new samples are dropped
    pub recorder_queue_capacity: usize,

    /// Maximum concurrent viewer connections
    pub max_viewers: usize,

    /// Unit attached to samples whose source reports none
    pub sample_unit: Option<String>,

    /// Period of the synthetic source in milliseconds
    pub simulate_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            viewer_queue_capacity: 64,
            recorder_queue_capacity: 1024,
            max_viewers: 100,
            sample_unit: None,
            simulate_interval_ms: 1000,
        }
    }
}

impl RelayConfig {
    /// Create a new config builder
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.viewer_queue_capacity == 0 {
            return Err(RelayError::Config(
                "viewer_queue_capacity must be at least 1".into(),
            ));
        }
        if self.recorder_queue_capacity == 0 {
            return Err(RelayError::Config(
                "recorder_queue_capacity must be at least 1".into(),
            ));
        }
        if self.max_viewers == 0 {
            return Err(RelayError::Config("max_viewers must be at least 1".into()));
        }
        if self.simulate_interval_ms == 0 {
            return Err(RelayError::Config(
                "simulate_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    viewer_queue_capacity: Option<usize>,
    recorder_queue_capacity: Option<usize>,
    max_viewers: Option<usize>,
    sample_unit: Option<String>,
    simulate_interval_ms: Option<u64>,
}

impl RelayConfigBuilder {
    /// Set per-viewer queue capacity
    pub fn viewer_queue_capacity(mut self, capacity: usize) -> Self {
        self.viewer_queue_capacity = Some(capacity);
        self
    }

    /// Set persistence queue capacity
    pub fn recorder_queue_capacity(mut self, capacity: usize) -> Self {
        self.recorder_queue_capacity = Some(capacity);
        self
    }

    /// Set maximum concurrent viewers
    pub fn max_viewers(mut self, max: usize) -> Self {
        self.max_viewers = Some(max);
        self
    }

    /// Set default sample unit (e.g. "C")
    pub fn sample_unit(mut self, unit: impl Into<String>) -> Self {
        self.sample_unit = Some(unit.into());
        self
    }

    /// Set synthetic source period
    pub fn simulate_interval_ms(mut self, ms: u64) -> Self {
        self.simulate_interval_ms = Some(ms);
        self
    }

    /// Build the configuration
    pub fn build(self) -> RelayConfig {
        let defaults = RelayConfig::default();

        RelayConfig {
            viewer_queue_capacity: self
                .viewer_queue_capacity
                .unwrap_or(defaults.viewer_queue_capacity),
            recorder_queue_capacity: self
                .recorder_queue_capacity
                .unwrap_or(defaults.recorder_queue_capacity),
            max_viewers: self.max_viewers.unwrap_or(defaults.max_viewers),
            sample_unit: self.sample_unit.or(defaults.sample_unit),
            simulate_interval_ms: self
                .simulate_interval_ms
                .unwrap_or(defaults.simulate_interval_ms),
        }
    }
}
