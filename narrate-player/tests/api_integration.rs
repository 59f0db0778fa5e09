//! Integration tests for the narrate-player HTTP API
//!
//! Requests go through the real router with `tower::ServiceExt::oneshot`;
//! audio is backed by WAV files written into a temporary directory.

mod helpers;

use axum::http::StatusCode;
use helpers::write_wav;
use narrate_common::timing::TimingStore;
use narrate_player::api::{build_router, AppContext};
use narrate_player::audio::{ClockOutputFactory, FileResolver, ResolverCache};
use narrate_player::playback::{spawn_scheduler, NarrationPlayer, SchedulerConfig};
use narrate_player::SharedState;
use serde_json::{json, Value};
use serial_test::serial;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Test helper to create a router over `audio_root`
fn setup_test_server(audio_root: &Path) -> axum::Router {
    let state = Arc::new(SharedState::default());
    let resolver = Arc::new(FileResolver::new(
        Some(audio_root.to_path_buf()),
        Arc::new(ResolverCache::new()),
    ));
    let outputs = Arc::new(ClockOutputFactory);

    let (scheduler, _task) = spawn_scheduler(
        SchedulerConfig { buffer_threshold: 2 },
        resolver.clone(),
        outputs.clone(),
        Arc::clone(&state),
    );
    let narration = NarrationPlayer::new(
        TimingStore::filesystem(),
        resolver,
        outputs,
        Duration::from_millis(16),
        Arc::clone(&state),
    );

    build_router(AppContext {
        state,
        scheduler,
        narration: Arc::new(Mutex::new(narration)),
        timings: TimingStore::filesystem(),
        audio_root: Some(audio_root.to_path_buf()),
        port: 5750,
    })
}

/// Helper function to make HTTP requests to the test server
async fn make_request(
    app: &axum::Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    use axum::body::Body;
    use http::{Method, Request};
    use tower::ServiceExt;

    let method = match method {
        "GET" => Method::GET,
        "POST" => Method::POST,
        _ => panic!("Unsupported method"),
    };

    let request = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => request
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };
    (status, json_body)
}

fn sentence_body(dir: &Path, job_id: &str, index: usize, total: usize) -> Value {
    let path = dir.join(format!("{}_{:03}.wav", job_id, index));
    write_wav(&path, 8000, 4000);
    json!({
        "job_id": job_id,
        "index": index,
        "total": total,
        "text": format!("Sentence {}.", index),
        "wav_path": path.to_str().unwrap(),
        "duration_secs": 0.5
    })
}

async fn wait_for_state(app: &axum::Router, path: &str, state: &str) -> Value {
    for _ in 0..500 {
        let (_, body) = make_request(app, "GET", path, None).await;
        let body = body.unwrap();
        if body["state"] == state {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never reached state {}", path, state);
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_test_server(dir.path());

    let (status, body) = make_request(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.expect("Expected response body");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "narrate-player");
    assert!(body["version"].is_string());
    assert!(body["git_hash"].is_string());
    assert_eq!(body["port"], 5750);
}

#[tokio::test]
async fn test_initial_status_is_idle() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_test_server(dir.path());

    let (status, body) = make_request(&app, "GET", "/playback/status", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["state"], "idle");
    assert_eq!(body["active_index"], -1);
    assert!(body["job_id"].is_null());
}

#[tokio::test]
async fn test_streaming_job_plays_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_test_server(dir.path());

    let (status, body) =
        make_request(&app, "POST", "/playback/job", Some(json!({ "job_id": "job-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["state"], "buffering");

    for index in [1, 0] {
        let (status, body) = make_request(
            &app,
            "POST",
            "/playback/sentence",
            Some(sentence_body(dir.path(), "job-1", index, 2)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["job_id"], "job-1");
    }

    let body = wait_for_state(&app, "/playback/status", "complete").await;
    assert_eq!(body["total_expected"], 2);
    assert_eq!(body["active_index"], -1);
    let sentences = body["sentences"].as_array().unwrap();
    assert_eq!(sentences.len(), 2);
    assert_eq!(sentences[0]["index"], 0);
    assert_eq!(sentences[1]["ready"], true);
}

#[tokio::test]
async fn test_pause_and_play_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_test_server(dir.path());

    make_request(&app, "POST", "/playback/job", Some(json!({ "job_id": "job-2" }))).await;
    for index in 0..2 {
        make_request(
            &app,
            "POST",
            "/playback/sentence",
            Some(sentence_body(dir.path(), "job-2", index, 3)),
        )
        .await;
    }
    wait_for_state(&app, "/playback/status", "playing").await;

    let (status, body) = make_request(&app, "POST", "/playback/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["state"], "paused");

    let (status, body) = make_request(&app, "POST", "/playback/play", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["is_playing"], true);
}

#[tokio::test]
async fn test_clearing_job() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_test_server(dir.path());

    make_request(&app, "POST", "/playback/job", Some(json!({ "job_id": "job-3" }))).await;
    let (status, body) =
        make_request(&app, "POST", "/playback/job", Some(json!({ "job_id": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["state"], "idle");
}

#[tokio::test]
async fn test_malformed_sentence_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_test_server(dir.path());

    let (status, _) = make_request(
        &app,
        "POST",
        "/playback/sentence",
        Some(json!({ "job_id": "job-1", "index": "first" })),
    )
    .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_timing_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("chapter_timing.json"),
        r#"[{"text":"One.","start":0.0,"end":0.2},{"text":"Two.","start":0.2,"end":0.5}]"#,
    )
    .unwrap();
    let app = setup_test_server(dir.path());

    let (status, body) =
        make_request(&app, "GET", "/timing?audio_path=chapter_final.wav", None).await;
    assert_eq!(status, StatusCode::OK);
    let segments = body.unwrap()["segments"].as_array().unwrap().clone();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[1]["text"], "Two.");

    // Naming convention not followed
    let (_, body) = make_request(&app, "GET", "/timing?audio_path=chapter.wav", None).await;
    assert!(body.unwrap()["segments"].is_null());

    // Convention followed, no timing file
    let (_, body) = make_request(&app, "GET", "/timing?audio_path=other_final.wav", None).await;
    assert!(body.unwrap()["segments"].is_null());
}

#[tokio::test]
async fn test_narration_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("chapter_final.wav"), 8000, 8000);
    std::fs::write(
        dir.path().join("chapter_timing.json"),
        r#"[{"text":"One.","start":0.0,"end":0.5},{"text":"Two.","start":0.5,"end":1.0}]"#,
    )
    .unwrap();
    let app = setup_test_server(dir.path());

    let (status, body) = make_request(
        &app,
        "POST",
        "/narration/open",
        Some(json!({ "audio_path": "chapter_final.wav" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["segments"].as_array().unwrap().len(), 2);
    assert_eq!(body["active_index"], -1);
    assert_eq!(body["is_playing"], false);

    let (status, _) = make_request(&app, "POST", "/narration/play", None).await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (_, body) = make_request(&app, "GET", "/narration/status", None).await;
    let body = body.unwrap();
    assert_eq!(body["is_playing"], true);
    assert_eq!(body["active_index"], 0);

    let (status, body) = make_request(&app, "POST", "/narration/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_some());

    let (status, body) = make_request(&app, "POST", "/narration/close", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert!(body["audio_path"].is_null());
    assert!(body["segments"].is_null());
}

#[tokio::test]
async fn test_narration_open_missing_asset() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_test_server(dir.path());

    let (status, body) = make_request(
        &app,
        "POST",
        "/narration/open",
        Some(json!({ "audio_path": "absent_final.wav" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.unwrap()["status"].as_str().unwrap().starts_with("error"));
}

#[tokio::test]
async fn test_narration_play_without_open() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_test_server(dir.path());

    let (status, _) = make_request(&app, "POST", "/narration/play", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
#[serial]
async fn test_narration_open_with_relative_audio_root() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("audio")).unwrap();
    write_wav(&dir.path().join("audio/story_final.wav"), 8000, 8000);
    std::fs::write(
        dir.path().join("audio/story_timing.json"),
        r#"[{"text":"Once.","start":0.0,"end":1.0}]"#,
    )
    .unwrap();

    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    let app = setup_test_server(Path::new("audio"));

    let (open_status, open_body) = make_request(
        &app,
        "POST",
        "/narration/open",
        Some(json!({ "audio_path": "story_final.wav" })),
    )
    .await;
    let (_, timing_body) =
        make_request(&app, "GET", "/timing?audio_path=story_final.wav", None).await;
    std::env::set_current_dir(previous).unwrap();

    assert_eq!(open_status, StatusCode::OK);
    assert_eq!(open_body.unwrap()["segments"].as_array().unwrap().len(), 1);
    assert_eq!(timing_body.unwrap()["segments"].as_array().unwrap().len(), 1);
}
