//! HTTP request handlers
//!
//! Control endpoints reply with the resulting status so a client never has
//! to poll after issuing a command.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::playback::{NarrationStatus, PlayerStatus};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use narrate_common::events::SentenceAudioEvent;
use narrate_common::timing::TimingSegment;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
    port: u16,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct JobRequest {
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimingQuery {
    audio_path: String,
}

#[derive(Debug, Serialize)]
pub struct TimingResponse {
    segments: Option<Vec<TimingSegment>>,
}

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    audio_path: String,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(code: StatusCode, e: &Error) -> ApiError {
    (
        code,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn scheduler_error(e: Error) -> ApiError {
    error!("Scheduler unavailable: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, &e)
}

fn narration_error(e: Error) -> ApiError {
    let code = match &e {
        Error::Resolve(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Playback(_) | Error::AudioOutput(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Narration request failed: {}", e);
    api_error(code, &e)
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "narrate-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        port: ctx.port,
    })
}

// ============================================================================
// Streaming Playback Endpoints
// ============================================================================

/// Wait for the scheduler to apply the command, then report its status
async fn settled_status(ctx: &AppContext) -> Result<Json<PlayerStatus>, ApiError> {
    ctx.scheduler.flush().await.map_err(scheduler_error)?;
    Ok(Json(ctx.scheduler.status()))
}

/// POST /playback/job - Select (or clear) the streaming job
pub async fn set_job(
    State(ctx): State<AppContext>,
    Json(req): Json<JobRequest>,
) -> Result<Json<PlayerStatus>, ApiError> {
    info!(job_id = ?req.job_id, "Job selected");
    ctx.scheduler.set_job(req.job_id).map_err(scheduler_error)?;
    settled_status(&ctx).await
}

/// POST /playback/sentence - Chunk-arrival notification
pub async fn sentence_arrived(
    State(ctx): State<AppContext>,
    Json(event): Json<SentenceAudioEvent>,
) -> Result<Json<PlayerStatus>, ApiError> {
    debug!(job_id = %event.job_id, index = event.index, total = event.total, "Sentence audio arrived");
    ctx.scheduler.chunk_arrived(event).map_err(scheduler_error)?;
    settled_status(&ctx).await
}

/// POST /playback/play
pub async fn play(State(ctx): State<AppContext>) -> Result<Json<PlayerStatus>, ApiError> {
    ctx.scheduler.play().map_err(scheduler_error)?;
    settled_status(&ctx).await
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> Result<Json<PlayerStatus>, ApiError> {
    ctx.scheduler.pause().map_err(scheduler_error)?;
    settled_status(&ctx).await
}

/// GET /playback/status
pub async fn playback_status(State(ctx): State<AppContext>) -> Json<PlayerStatus> {
    Json(ctx.scheduler.status())
}

// ============================================================================
// Timing Endpoint
// ============================================================================

/// GET /timing?audio_path=... - Timing map of a narration asset, if any
pub async fn get_timing(
    State(ctx): State<AppContext>,
    Query(query): Query<TimingQuery>,
) -> Json<TimingResponse> {
    let path = ctx.asset_path(&query.audio_path);
    let segments = ctx.timings.load(&path).await;
    Json(TimingResponse { segments })
}

// ============================================================================
// Continuous Narration Endpoints
// ============================================================================

/// POST /narration/open
pub async fn narration_open(
    State(ctx): State<AppContext>,
    Json(req): Json<OpenRequest>,
) -> Result<Json<NarrationStatus>, ApiError> {
    let path = ctx.asset_path(&req.audio_path);
    let mut narration = ctx.narration.lock().await;
    narration.open(&path).await.map_err(narration_error)?;
    Ok(Json(narration.status()))
}

/// POST /narration/play
pub async fn narration_play(
    State(ctx): State<AppContext>,
) -> Result<Json<NarrationStatus>, ApiError> {
    let narration = ctx.narration.lock().await;
    narration.play().map_err(narration_error)?;
    Ok(Json(narration.status()))
}

/// POST /narration/pause
pub async fn narration_pause(
    State(ctx): State<AppContext>,
) -> Result<Json<NarrationStatus>, ApiError> {
    let narration = ctx.narration.lock().await;
    narration.pause().map_err(narration_error)?;
    Ok(Json(narration.status()))
}

/// POST /narration/close
pub async fn narration_close(State(ctx): State<AppContext>) -> Json<NarrationStatus> {
    let mut narration = ctx.narration.lock().await;
    narration.close();
    Json(narration.status())
}

/// GET /narration/status
pub async fn narration_status(State(ctx): State<AppContext>) -> Json<NarrationStatus> {
    Json(ctx.narration.lock().await.status())
}
