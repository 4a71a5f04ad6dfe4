// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Roast WebSocket Relay - live roaster temperature for browsers.
//!
//! Reads temperature readings from the roaster's sensor link (or a local
//! simulator), pushes every reading to all connected viewers, and records
//! readings while a roast session is open.
//!
//! # Usage
//!
//! ```bash
//! # Relay the sensor at the default address on port 8080
//! roast-ws
//!
//! # No hardware: simulate a reading every second
//! roast-ws --simulate
//!
//! # Inspect recorded sessions
//! roast-ws sessions
//! roast-ws show <session-id>
//! ```
//!
//! # Endpoints
//!
//! - `GET /temp` - WebSocket: live readings and session control
//! - `GET /health` - Health check
//! - `GET /api/v1/temp/roast_sessions` - Recorded sessions
//! - `GET /api/v1/temp/roast_sessions/:id` - Samples and marks of a session
//! - `DELETE /api/v1/temp/roast_sessions/:id` - Delete a session
//! - `POST /api/v1/temp/roast_sessions/mark` - Record a mark
//! - anything else - static files

mod admin;
mod routes;
mod upstream;
mod viewer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use roast_relay::{PersistenceGateway, RelayConfig, RelayEngine, SimulatedSource, SqliteStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use upstream::UpstreamSource;

/// Roast telemetry relay
#[derive(Parser, Debug, Clone)]
#[command(name = "roast-ws")]
#[command(about = "Roast telemetry relay - live temperature and session recording")]
#[command(version)]
struct Args {
    /// HTTP / WebSocket server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Database path (SQLite file)
    #[arg(short, long, default_value = "./data/data.db")]
    db: String,

    /// Sensor address (host:port)
    #[arg(short, long, default_value = "192.168.100.9:81")]
    upstream: String,

    /// Simulate readings instead of connecting to the sensor
    #[arg(long)]
    simulate: bool,

    /// Simulated reading period in milliseconds
    #[arg(long, default_value_t = 1000)]
    simulate_interval_ms: u64,

    /// Directory served for non-API paths
    #[arg(long, default_value = "static")]
    static_dir: String,

    /// Maximum concurrent viewers
    #[arg(long, default_value_t = 100)]
    max_viewers: usize,

    /// Outbound frames buffered per viewer
    #[arg(long, default_value_t = 64)]
    viewer_queue: usize,

    /// Samples buffered for the storage worker
    #[arg(long, default_value_t = 1024)]
    recorder_queue: usize,

    /// Unit label for readings that carry none (e.g. "C")
    #[arg(long)]
    unit: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// List recorded sessions
    Sessions,
    /// Show samples and marks of a session
    Show {
        /// Session id
        id: String,
    },
    /// Delete a session with its samples and marks
    Delete {
        /// Session id
        id: String,
        /// Confirm deletion
        #[arg(long)]
        confirm: bool,
    },
}

/// Shared application state
pub struct AppState {
    engine: Arc<RelayEngine>,
    viewer_count: AtomicUsize,
}

impl AppState {
    pub fn new(engine: Arc<RelayEngine>) -> Self {
        Self {
            engine,
            viewer_count: AtomicUsize::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<RelayEngine> {
        &self.engine
    }

    /// Take a viewer slot. Returns false when all slots are taken.
    fn try_reserve_viewer(&self) -> bool {
        let max = self.engine.config().max_viewers;
        match self
            .viewer_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < max).then_some(count + 1)
            }) {
            Ok(previous) => {
                info!("Viewer connected. Total: {}", previous + 1);
                true
            }
            Err(_) => false,
        }
    }

    /// Give back a slot taken by `try_reserve_viewer`.
    fn release_viewer(&self) {
        let previous = self
            .viewer_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or(0);
        info!("Viewer disconnected. Total: {}", previous.saturating_sub(1));
    }

    fn viewer_count(&self) -> usize {
        self.viewer_count.load(Ordering::SeqCst)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let store = SqliteStore::new(&args.db)?;

    if let Some(cmd) = args.command.clone() {
        return handle_command(cmd, store);
    }

    info!("Roast relay v{}", env!("CARGO_PKG_VERSION"));
    info!("  Database: {}", args.db);
    if args.simulate {
        info!("  Source: simulator ({} ms)", args.simulate_interval_ms);
    } else {
        info!("  Source: ws://{}/", args.upstream);
    }

    let mut config = RelayConfig::builder()
        .viewer_queue_capacity(args.viewer_queue)
        .recorder_queue_capacity(args.recorder_queue)
        .max_viewers(args.max_viewers)
        .simulate_interval_ms(args.simulate_interval_ms);
    if let Some(unit) = &args.unit {
        config = config.sample_unit(unit);
    }

    let engine = Arc::new(RelayEngine::new(config.build(), Arc::new(store))?);
    let state = Arc::new(AppState::new(Arc::clone(&engine)));

    let (stop_ingest, ingest_stopped) = oneshot::channel::<()>();
    let ingest = spawn_ingest(Arc::clone(&engine), &args, ingest_stopped);

    let app = routes::api_routes()
        .merge(routes::live_routes())
        .fallback_service(ServeDir::new(&args.static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", args.bind, args.port);
    info!("WebSocket endpoint: ws://{}/temp", addr);
    info!("Session API: http://{}/api/v1/temp/roast_sessions", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Close the open session before the sensor link goes away.
    if let Some(session) = engine.shutdown().await {
        info!("Ended session {} '{}'", session.id, session.name);
    }
    let _ = stop_ingest.send(());
    match tokio::time::timeout(Duration::from_secs(5), ingest).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Ingest task failed: {}", e),
        Err(_) => warn!("Ingest task did not stop in time"),
    }

    info!("Roast relay stopped");
    Ok(())
}

/// Start the ingest loop on its own task.
///
/// A dead sensor link ends telemetry only; viewers keep their control
/// channel and the session API stays up.
fn spawn_ingest(
    engine: Arc<RelayEngine>,
    args: &Args,
    stopped: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    let simulate = args.simulate;
    let upstream = args.upstream.clone();
    let interval = Duration::from_millis(args.simulate_interval_ms);
    let unit = args.unit.clone();

    tokio::spawn(async move {
        let shutdown = async {
            let _ = stopped.await;
        };

        let result = if simulate {
            let source = SimulatedSource::new(interval).with_unit(unit);
            engine.run_until(source, shutdown).await
        } else {
            match UpstreamSource::connect(&upstream).await {
                Ok(source) => engine.run_until(source, shutdown).await,
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(count) => info!("Ingest finished after {} samples", count),
            Err(e) => error!("Telemetry stopped: {}", e),
        }
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, shutting down"),
        Err(e) => error!("Could not listen for interrupt: {}", e),
    }
}

fn handle_command(cmd: Commands, store: SqliteStore) -> Result<()> {
    match cmd {
        Commands::Sessions => {
            let sessions = store.list_sessions()?;
            println!("{} recorded sessions:", sessions.len());
            for session in &sessions {
                let state = if session.is_ended() { "ended" } else { "open" };
                println!(
                    "  {}  '{}'  created={}  end={}  ({})",
                    session.id, session.name, session.created_at_ms, session.ended_at_ms, state
                );
            }
        }
        Commands::Show { id } => {
            let samples = store.list_samples(&id)?;
            let marks = store.list_marks(&id)?;
            println!("Session {}: {} samples, {} marks", id, samples.len(), marks.len());
            for sample in &samples {
                println!("  ts={}  temp={:.2}", sample.timestamp_ms, sample.value);
            }
            for mark in &marks {
                println!(
                    "  mark '{}' at ts={} temp={:.2}",
                    mark.name, mark.created_at_ms, mark.temperature
                );
            }
        }
        Commands::Delete { id, confirm } => {
            if !confirm {
                println!("Use --confirm to delete session {}", id);
                return Ok(());
            }
            store.delete_session(&id)?;
            println!("Deleted session {}", id);
        }
    }

    Ok(())
}
