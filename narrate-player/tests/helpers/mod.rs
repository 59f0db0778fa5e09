//! Shared fixtures for integration tests
//!
//! - [`ScriptedResolver`]: resolves any reference to a handle of a fixed
//!   duration, with per-reference delays and failures.
//! - [`RecordingOutputFactory`]: clock-driven outputs that remember the order
//!   they were opened in and can refuse their first start.

#![allow(dead_code)]

use async_trait::async_trait;
use narrate_common::events::SentenceAudioEvent;
use narrate_player::audio::{
    AudioHandle, AudioOutput, AudioResolver, ClockOutput, OutputEvent, OutputFactory,
};
use narrate_player::error::ResolveError;
use narrate_player::playback::PlayerStatus;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Chunk-arrival notification with a reference derived from job and index
pub fn sentence(job_id: &str, index: usize, total: usize) -> SentenceAudioEvent {
    SentenceAudioEvent {
        job_id: job_id.to_string(),
        index,
        total,
        text: format!("Sentence {} of {}.", index, job_id),
        wav_path: reference(job_id, index),
        duration_secs: 1.0,
    }
}

pub fn reference(job_id: &str, index: usize) -> String {
    format!("/tmp/narrate/{}/sentence_{:03}.wav", job_id, index)
}

/// Wait until the published status satisfies `predicate`
pub async fn wait_for_status(
    rx: &mut watch::Receiver<PlayerStatus>,
    predicate: impl Fn(&PlayerStatus) -> bool,
) -> PlayerStatus {
    let wait = async {
        loop {
            let status = rx.borrow_and_update().clone();
            if predicate(&status) {
                return status;
            }
            rx.changed().await.expect("scheduler stopped");
        }
    };
    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .expect("Timed out waiting for status")
}

/// Write a silent mono 16-bit WAV of `frames` samples
pub fn write_wav(path: &Path, sample_rate: u32, frames: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..frames {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Default)]
pub struct ScriptedResolver {
    duration: Duration,
    delays: Mutex<HashMap<String, Duration>>,
    failures: Mutex<HashMap<String, ResolveError>>,
    calls: Mutex<Vec<String>>,
    released: Mutex<Vec<String>>,
}

impl ScriptedResolver {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn delay(&self, reference: impl Into<String>, delay: Duration) {
        self.delays.lock().unwrap().insert(reference.into(), delay);
    }

    pub fn fail(&self, reference: impl Into<String>) {
        let reference = reference.into();
        self.failures
            .lock()
            .unwrap()
            .insert(reference.clone(), ResolveError::NotFound(reference));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// References the scheduler said it no longer needs
    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioResolver for ScriptedResolver {
    async fn resolve(&self, reference: &str) -> Result<AudioHandle, ResolveError> {
        self.calls.lock().unwrap().push(reference.to_string());

        let delay = self.delays.lock().unwrap().get(reference).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().get(reference).cloned();
        match failure {
            Some(e) => Err(e),
            None => Ok(AudioHandle::new(reference, self.duration)),
        }
    }

    async fn release(&self, references: &[String]) {
        self.released.lock().unwrap().extend_from_slice(references);
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Clock output that can refuse its first start, and records stops
pub struct RecordingOutput {
    clock: ClockOutput,
    refuse_next: AtomicBool,
    stopped: AtomicBool,
}

impl RecordingOutput {
    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl AudioOutput for RecordingOutput {
    fn play(&self) -> narrate_player::Result<()> {
        if self.refuse_next.swap(false, Ordering::SeqCst) {
            return Err(narrate_player::Error::AudioOutput(
                "playback not allowed".to_string(),
            ));
        }
        self.clock.play()
    }

    fn pause(&self) {
        self.clock.pause()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.clock.stop()
    }

    fn position(&self) -> Duration {
        self.clock.position()
    }

    fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.clock.subscribe()
    }
}

#[derive(Default)]
pub struct RecordingOutputFactory {
    opened: Mutex<Vec<(String, Arc<RecordingOutput>)>>,
    refusals: AtomicUsize,
}

impl RecordingOutputFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` outputs refuse their first start
    pub fn refuse_starts(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// References of opened outputs, in opening order
    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(reference, _)| reference.clone())
            .collect()
    }

    pub fn output(&self, position: usize) -> Arc<RecordingOutput> {
        Arc::clone(&self.opened.lock().unwrap()[position].1)
    }
}

impl OutputFactory for RecordingOutputFactory {
    fn open(&self, handle: &AudioHandle) -> Arc<dyn AudioOutput> {
        let refuse = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let output = Arc::new(RecordingOutput {
            clock: ClockOutput::new(handle.duration()),
            refuse_next: AtomicBool::new(refuse),
            stopped: AtomicBool::new(false),
        });
        self.opened
            .lock()
            .unwrap()
            .push((handle.reference().to_string(), Arc::clone(&output)));
        output
    }
}
