// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Viewer control channel protocol.
//!
//! JSON text frames in both directions. Inbound messages carry a `cmd`
//! field; outbound messages carry a `type` field.

use crate::error::{RelayError, Result};
use crate::sample::Sample;
use crate::session::ActiveSession;
use crate::store::Mark;
use serde::Serialize;
use serde_json::Value;

/// Viewer → relay control commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Open a recording session
    Start { session_name: String },

    /// Close the open session
    Stop,

    /// Fetch the open session and its history
    Get,

    /// Any other `cmd` value
    Unknown(String),
}

impl ControlCommand {
    /// Decode one inbound text frame.
    ///
    /// - not JSON: `Err(MalformedCommand)`
    /// - JSON without a string `cmd` field: `Ok(None)`
    /// - otherwise: `Ok(Some(command))`, with unrecognized names as `Unknown`
    pub fn decode(text: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RelayError::MalformedCommand(format!("invalid JSON: {}", e)))?;

        let Some(cmd) = value.get("cmd").and_then(Value::as_str) else {
            return Ok(None);
        };

        let command = match cmd {
            "start" => ControlCommand::Start {
                session_name: value
                    .get("session_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            "stop" => ControlCommand::Stop,
            "get" => ControlCommand::Get,
            other => ControlCommand::Unknown(other.to_string()),
        };

        Ok(Some(command))
    }
}

/// Relay → viewer messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Live sample, sent to every viewer
    Temp(Sample),

    /// Reply to `start`
    StartResponse {
        msg: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<bool>,
    },

    /// Reply to `get`
    GetResponse {
        msg: String,
        error: bool,
        has_session: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_created_at: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        temps: Option<Vec<Sample>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        marks: Option<Vec<Mark>>,
    },
}

impl ServerMessage {
    /// Successful `start`
    pub fn session_started(session: &ActiveSession) -> Self {
        Self::StartResponse {
            msg: "session started".to_string(),
            session_id: Some(session.id.clone()),
            session_name: Some(session.name.clone()),
            error: None,
        }
    }

    /// Failed `start`
    pub fn start_failed(msg: impl Into<String>) -> Self {
        Self::StartResponse {
            msg: msg.into(),
            session_id: None,
            session_name: None,
            error: Some(true),
        }
    }

    /// `get` while a session is open
    pub fn session_snapshot(session: &ActiveSession, temps: Vec<Sample>, marks: Vec<Mark>) -> Self {
        Self::GetResponse {
            msg: "session data".to_string(),
            error: false,
            has_session: true,
            session_name: Some(session.name.clone()),
            session_id: Some(session.id.clone()),
            session_created_at: Some(session.created_at_ms),
            temps: Some(temps),
            marks: Some(marks),
        }
    }

    /// `get` while a session is open but its history could not be read
    pub fn session_unavailable(session: &ActiveSession) -> Self {
        Self::GetResponse {
            msg: "could not load session data".to_string(),
            error: true,
            has_session: true,
            session_name: Some(session.name.clone()),
            session_id: Some(session.id.clone()),
            session_created_at: Some(session.created_at_ms),
            temps: None,
            marks: None,
        }
    }

    /// `get` while idle
    pub fn no_session() -> Self {
        Self::GetResponse {
            msg: "no roast session is active".to_string(),
            error: true,
            has_session: false,
            session_name: None,
            session_id: None,
            session_created_at: None,
            temps: None,
            marks: None,
        }
    }
}
