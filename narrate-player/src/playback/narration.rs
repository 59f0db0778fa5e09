//! Continuous narration player
//!
//! Plays one finished narration asset with text-sync highlighting. Opening an
//! asset loads its timing map (when one exists), resolves the audio, opens an
//! output and binds the [`HighlightDriver`] to it. Highlight changes are
//! broadcast as [`NarrateEvent::HighlightChanged`].

use crate::audio::{AudioOutput, AudioResolver, OutputFactory};
use crate::error::{Error, Result};
use crate::playback::highlight::{HighlightDriver, HighlightState};
use crate::state::SharedState;
use narrate_common::events::{active_index, NarrateEvent};
use narrate_common::timing::{TimingSegment, TimingStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Observable narration state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrationStatus {
    pub audio_path: Option<String>,
    /// Timing map of the open asset; `None` for legacy assets
    pub segments: Option<Vec<TimingSegment>>,
    #[serde(with = "active_index")]
    pub active_index: Option<usize>,
    pub is_playing: bool,
}

struct OpenNarration {
    audio_path: PathBuf,
    output: Arc<dyn AudioOutput>,
}

/// Plays one narration asset at a time
pub struct NarrationPlayer {
    timings: TimingStore,
    resolver: Arc<dyn AudioResolver>,
    outputs: Arc<dyn OutputFactory>,
    highlight: HighlightDriver,
    current: Option<OpenNarration>,
    forwarder: JoinHandle<()>,
}

impl NarrationPlayer {
    pub fn new(
        timings: TimingStore,
        resolver: Arc<dyn AudioResolver>,
        outputs: Arc<dyn OutputFactory>,
        frame_interval: Duration,
        state: Arc<SharedState>,
    ) -> Self {
        let highlight = HighlightDriver::new(frame_interval);
        let mut changes = highlight.subscribe();

        let forwarder = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let HighlightState {
                    active_index,
                    is_playing,
                } = *changes.borrow_and_update();
                state.broadcast_event(NarrateEvent::HighlightChanged {
                    active_index,
                    is_playing,
                    timestamp: narrate_common::time::now(),
                });
            }
        });

        Self {
            timings,
            resolver,
            outputs,
            highlight,
            current: None,
            forwarder,
        }
    }

    /// Open `audio_path`, replacing whatever was open. Playback does not
    /// start until [`Self::play`].
    pub async fn open(&mut self, audio_path: &Path) -> Result<()> {
        self.close();

        let segments = self.timings.load(audio_path).await;
        let handle = self
            .resolver
            .resolve(&audio_path.to_string_lossy())
            .await?;
        let output = self.outputs.open(&handle);

        info!(
            audio_path = %audio_path.display(),
            duration_secs = handle.duration().as_secs_f64(),
            segments = segments.as_ref().map(|s| s.len()),
            "Narration opened"
        );

        self.highlight.set_segments(segments);
        self.highlight.bind_output(Some(Arc::clone(&output)));
        self.current = Some(OpenNarration {
            audio_path: audio_path.to_path_buf(),
            output,
        });
        Ok(())
    }

    /// Start or resume the open narration
    pub fn play(&self) -> Result<()> {
        let current = self.current()?;
        debug!(audio_path = %current.audio_path.display(), "Narration play");
        current.output.play()
    }

    pub fn pause(&self) -> Result<()> {
        let current = self.current()?;
        debug!(audio_path = %current.audio_path.display(), "Narration pause");
        current.output.pause();
        Ok(())
    }

    /// Stop and forget the open narration
    pub fn close(&mut self) {
        if let Some(current) = self.current.take() {
            current.output.stop();
            self.highlight.bind_output(None);
            self.highlight.set_segments(None);
            info!(audio_path = %current.audio_path.display(), "Narration closed");

            let resolver = Arc::clone(&self.resolver);
            let reference = current.audio_path.to_string_lossy().into_owned();
            tokio::spawn(async move { resolver.release(&[reference]).await });
        }
    }

    pub fn highlight(&self) -> HighlightState {
        self.highlight.state()
    }

    pub fn status(&self) -> NarrationStatus {
        let highlight = self.highlight.state();
        NarrationStatus {
            audio_path: self
                .current
                .as_ref()
                .map(|c| c.audio_path.display().to_string()),
            segments: self.highlight.segments().map(|s| s.to_vec()),
            active_index: highlight.active_index,
            is_playing: highlight.is_playing,
        }
    }

    fn current(&self) -> Result<&OpenNarration> {
        self.current
            .as_ref()
            .ok_or_else(|| Error::Playback("no narration is open".to_string()))
    }
}

impl Drop for NarrationPlayer {
    fn drop(&mut self) {
        if let Some(current) = self.current.take() {
            current.output.stop();
        }
        self.forwarder.abort();
    }
}
