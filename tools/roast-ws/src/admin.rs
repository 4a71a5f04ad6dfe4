// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP request handlers for the session API.

use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roast_relay::{DeleteOutcome, Mark, RelayError, SessionDetail};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// API error response
#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let code = match err {
            RelayError::MalformedCommand(_) => 400,
            RelayError::AlreadyActive | RelayError::NoActiveSession => 409,
            _ => 500,
        };
        warn!("Request failed: {}", err);
        Self {
            error: err.to_string(),
            code,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            error: rejection.body_text(),
            code: 400,
        }
    }
}

/// GET /api/v1/temp/roast_sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sessions = state.engine().history().list_sessions().await?;
    Ok(Json(json!({ "sessions": sessions })))
}

/// GET /api/v1/temp/roast_sessions/:id
pub async fn session_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError> {
    let detail = state.engine().history().session_detail(&id).await?;
    Ok(Json(detail))
}

/// DELETE /api/v1/temp/roast_sessions/:id
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<DeleteOutcome> {
    Json(state.engine().history().delete_session(&id).await)
}

/// POST /api/v1/temp/roast_sessions/mark
pub async fn record_mark(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Mark>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(mark) = body?;
    let stored = state.engine().history().record_mark(mark).await?;
    Ok(Json(json!({ "stored": stored })))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = state.engine();
    let session = engine.session().current();
    let hub = engine.hub().stats();
    let recorder = engine.recorder_stats();

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "viewers": state.viewer_count(),
        "recording": session.is_some(),
        "session_id": session.as_ref().map(|s| s.id.as_str()),
        "session_name": session.as_ref().map(|s| s.name.as_str()),
        "current": engine.current(),
        "frames_delivered": hub.frames_delivered,
        "frames_dropped": hub.frames_dropped,
        "samples_stored": recorder.samples_stored,
        "samples_dropped": recorder.samples_dropped,
    }))
}
