//! HTTP server setup and routing
//!
//! Sets up the axum router with control endpoints and the SSE stream.

use crate::error::{Error, Result};
use crate::playback::{NarrationPlayer, SchedulerHandle};
use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use narrate_common::timing::TimingStore;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub scheduler: SchedulerHandle,
    pub narration: Arc<Mutex<NarrationPlayer>>,
    pub timings: TimingStore,
    /// Base for relative narration asset paths
    pub audio_root: Option<PathBuf>,
    pub port: u16,
}

impl AppContext {
    /// Resolve a client-supplied asset path against the audio root
    ///
    /// The result is absolute, so the resolver does not apply its own root a
    /// second time when the configured root is itself relative.
    pub fn asset_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        let joined = match &self.audio_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        };
        if joined.is_absolute() {
            return joined;
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(joined),
            Err(e) => {
                warn!("Cannot read working directory for {}: {}", joined.display(), e);
                joined
            }
        }
    }
}

/// Build the router with all routes
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        // Streaming playback
        .route("/playback/job", post(super::handlers::set_job))
        .route("/playback/sentence", post(super::handlers::sentence_arrived))
        .route("/playback/play", post(super::handlers::play))
        .route("/playback/pause", post(super::handlers::pause))
        .route("/playback/status", get(super::handlers::playback_status))
        // Timing maps
        .route("/timing", get(super::handlers::get_timing))
        // Continuous narration
        .route("/narration/open", post(super::handlers::narration_open))
        .route("/narration/play", post(super::handlers::narration_play))
        .route("/narration/pause", post(super::handlers::narration_pause))
        .route("/narration/close", post(super::handlers::narration_close))
        .route("/narration/status", get(super::handlers::narration_status))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run HTTP API server until `shutdown` resolves
pub async fn run(ctx: AppContext, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.port));
    let app = build_router(ctx);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
