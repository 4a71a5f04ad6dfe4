// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route definitions for the session API and the live endpoint.

use crate::admin;
use crate::viewer;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Session history API
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/temp/roast_sessions",
            get(admin::list_sessions),
        )
        .route(
            "/api/v1/temp/roast_sessions/mark",
            post(admin::record_mark),
        )
        .route(
            "/api/v1/temp/roast_sessions/:id",
            get(admin::session_detail).delete(admin::delete_session),
        )
}

/// Live telemetry and health
pub fn live_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/temp", get(viewer::ws_handler))
        .route("/health", get(admin::health))
}
