//! Narrate Player (narrate-player) - Main entry point
//!
//! Streaming narration playback and text-sync highlighting service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use narrate_common::config::{resolve_audio_root, AUDIO_ROOT_ENV_VAR};
use narrate_common::timing::TimingStore;
use narrate_player::api::{self, AppContext};
use narrate_player::audio::{ClockOutputFactory, FileResolver, ResolverCache};
use narrate_player::config::TomlConfig;
use narrate_player::playback::{spawn_scheduler, NarrationPlayer, SchedulerConfig};
use narrate_player::SharedState;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for narrate-player
#[derive(Parser, Debug)]
#[command(name = "narrate-player")]
#[command(about = "Streaming narration playback service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "NARRATE_PORT")]
    port: Option<u16>,

    /// Configuration file
    #[arg(short, long, env = "NARRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for relative audio references
    #[arg(short, long)]
    audio_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("narrate_player={0},narrate_common={0},tower_http={0}", level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting narrate-player v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let port = args.port.unwrap_or(config.port);
    let audio_root = resolve_audio_root(
        args.audio_root.as_deref(),
        AUDIO_ROOT_ENV_VAR,
        config.audio_root.as_deref(),
    );
    info!("Audio root: {}", audio_root.display());

    let state = Arc::new(SharedState::new(config.playback.event_buffer));
    let cache = Arc::new(ResolverCache::new());
    let resolver = Arc::new(FileResolver::new(Some(audio_root.clone()), cache));
    let outputs = Arc::new(ClockOutputFactory);

    let (scheduler, scheduler_task) = spawn_scheduler(
        SchedulerConfig {
            buffer_threshold: config.playback.buffer_threshold,
        },
        resolver.clone(),
        outputs.clone(),
        Arc::clone(&state),
    );

    let narration = NarrationPlayer::new(
        TimingStore::filesystem(),
        resolver,
        outputs,
        config.playback.frame_interval(),
        Arc::clone(&state),
    );

    let ctx = AppContext {
        state,
        scheduler,
        narration: Arc::new(Mutex::new(narration)),
        timings: TimingStore::filesystem(),
        audio_root: Some(audio_root),
        port,
    };

    api::run(ctx, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Router (and with it every scheduler handle) is gone; let the task drain
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
