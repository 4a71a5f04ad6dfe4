// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Viewer connections on `/temp`.
//!
//! Each viewer gets a bounded outbound queue registered with the broadcast
//! hub and a writer task draining it into the socket. The read side feeds
//! control commands to the dispatcher; replies go through the same queue so
//! they stay ordered with live frames.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use roast_relay::{Frame, RelayEngine, RelayError, ViewerHandle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    if !state.try_reserve_viewer() {
        warn!("Viewer rejected: max viewers reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many viewers").into_response();
    }

    let failed = Arc::clone(&state);
    ws.on_failed_upgrade(move |e| {
        debug!("Viewer upgrade failed: {}", e);
        failed.release_viewer();
    })
    .on_upgrade(move |socket| handle_socket(socket, state))
    .into_response()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = ViewerSession::new(Arc::clone(state.engine()));
    session.run(socket).await;
    state.release_viewer();
}

/// One connected viewer
pub struct ViewerSession {
    engine: Arc<RelayEngine>,
    handle: ViewerHandle,
    rx: mpsc::Receiver<Frame>,
}

impl ViewerSession {
    pub fn new(engine: Arc<RelayEngine>) -> Self {
        let (handle, rx) = ViewerHandle::channel(engine.config().viewer_queue_capacity);
        info!("[{}] New viewer", handle.id());
        Self { engine, handle, rx }
    }

    /// Serve the viewer until it disconnects or sends an unusable command.
    pub async fn run(self, socket: WebSocket) {
        let Self {
            engine,
            handle,
            mut rx,
        } = self;
        let viewer_id = handle.id();
        let (mut ws_tx, mut ws_rx) = socket.split();

        let ws_forward = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if ws_tx.send(Message::Text(frame.to_string())).await.is_err() {
                    debug!("[{}] WebSocket send failed, closing", viewer_id);
                    break;
                }
            }
        });

        engine.hub().subscribe(&handle);
        let dispatcher = engine.dispatcher();

        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => match dispatcher.handle_frame(&text).await {
                    Ok(Some(reply)) => {
                        if !handle.send(&reply).await {
                            debug!("[{}] Reply not delivered, closing", viewer_id);
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e @ RelayError::MalformedCommand(_)) => {
                        warn!("[{}] {}, closing", viewer_id, e);
                        break;
                    }
                    Err(e) => {
                        error!("[{}] Command failed: {}", viewer_id, e);
                    }
                },
                Ok(Message::Close(_)) => {
                    info!("[{}] Viewer closed connection", viewer_id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Axum handles pong automatically
                }
                Ok(Message::Pong(_)) => {
                    debug!("[{}] Pong received", viewer_id);
                }
                Ok(Message::Binary(_)) => {
                    warn!("[{}] Binary messages not supported", viewer_id);
                }
                Err(e) => {
                    debug!("[{}] WebSocket error: {}", viewer_id, e);
                    break;
                }
            }
        }

        engine.hub().unsubscribe(viewer_id);
        ws_forward.abort();
        info!("[{}] Viewer session ended", viewer_id);
    }
}
