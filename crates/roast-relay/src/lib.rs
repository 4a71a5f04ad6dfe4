// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Roast Relay
//!
//! Relays a live temperature stream from one upstream sensor to any number
//! of viewers, and records it together with operator marks while a roast
//! session is open.
//!
//! # Architecture
//!
//! ```text
//! RelayEngine
//! +-- SampleSource        (sensor link, simulator, or channel)
//! +-- BroadcastHub        (bounded queue per viewer, drop-newest)
//! +-- SessionStateMachine (Idle <-> Recording, one session at a time)
//! +-- SampleRecorder      (bounded queue -> single storage worker)
//! +-- CommandDispatcher   (viewer start / stop / get)
//! +-- SessionHistory      (list / detail / delete / marks)
//! +-- PersistenceGateway  (SQLite backend)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use roast_relay::{RelayConfig, RelayEngine, SimulatedSource, SqliteStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(SqliteStore::new("data/data.db")?);
//! let engine = Arc::new(RelayEngine::new(RelayConfig::default(), store)?);
//! engine.run(SimulatedSource::new(Duration::from_secs(1))).await?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod hub;
pub mod protocol;
pub mod recorder;
pub mod sample;
pub mod session;
pub mod source;
pub mod sqlite;
pub mod store;

mod engine;

pub use config::RelayConfig;
pub use dispatcher::CommandDispatcher;
pub use engine::RelayEngine;
pub use error::RelayError;
pub use history::{DeleteOutcome, SessionDetail, SessionHistory};
pub use hub::{BroadcastHub, Frame, HubStats, PublishOutcome, ViewerHandle, ViewerId};
pub use protocol::{ControlCommand, ServerMessage};
pub use recorder::{RecorderStats, SampleRecorder};
pub use sample::{now_millis, CurrentValue, Sample};
pub use session::{ActiveSession, SessionStateMachine};
pub use source::{ChannelSource, FailedSource, SampleSource, SimulatedSource};
pub use sqlite::SqliteStore;
pub use store::{Mark, PersistenceGateway, SessionRecord, SharedGateway};
