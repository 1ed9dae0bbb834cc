//! SSE replay server for recorded telemetry.
//!
//! Serves a pre-loaded newline-delimited record file as a server-sent-events
//! stream: one record per second per connection, cycling back to the start
//! when the file runs out. This is the feed a dashboard (or the `live`
//! command) connects to during development and demos.
//!
//! ```text
//! recorded JSONL ──→ GET /stream ──→ one `data:` frame per second
//! ```

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random).
    pub port: u16,
    /// Record lines to cycle through, one JSON record each.
    pub lines: Vec<String>,
    /// Delivery cadence per connection.
    pub tick: Duration,
}

impl ServerConfig {
    /// Create a new server configuration with the standard one-second tick.
    pub fn new(port: u16, lines: Vec<String>) -> Self {
        Self {
            port,
            lines,
            tick: Duration::from_secs(1),
        }
    }
}

/// Shared server state.
struct ServerState {
    lines: Vec<String>,
    tick: Duration,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub records: usize,
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        records: state.lines.len(),
    })
}

/// GET /stream
///
/// Each connection gets its own cursor into the recorded lines; the first
/// record goes out immediately, then one per tick, wrapping around at the
/// end.
async fn stream(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let lines = state.lines.clone();
    let ticks = IntervalStream::new(tokio::time::interval(state.tick));
    let mut cursor = 0usize;
    let events = ticks.map(move |_| {
        let line = lines[cursor % lines.len()].clone();
        cursor += 1;
        Ok(Event::default().data(line))
    });
    Sse::new(events)
}

/// Run the replay server.
///
/// Returns the bound address and a shutdown sender; dropping or firing the
/// sender stops the server.
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    if config.lines.is_empty() {
        anyhow::bail!("no records to serve");
    }

    let state = Arc::new(ServerState {
        lines: config.lines,
        tick: config.tick,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/stream", get(stream))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("replay server listening on http://{}/stream", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("replay server shutdown signal received");
            })
            .await
        {
            tracing::error!("replay server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
