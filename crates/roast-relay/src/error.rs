// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay error taxonomy.

use thiserror::Error;

/// Errors surfaced by the relay core.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A recording session is already open.
    #[error("a roast session is already active")]
    AlreadyActive,

    /// No recording session is open.
    #[error("no roast session is active")]
    NoActiveSession,

    /// A storage call failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// An inbound viewer message could not be understood.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// The upstream sample source terminated.
    #[error("upstream disconnected: {0}")]
    UpstreamDisconnected(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<anyhow::Error> for RelayError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the context chain on one line
        Self::Persistence(format!("{:#}", err))
    }
}

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
