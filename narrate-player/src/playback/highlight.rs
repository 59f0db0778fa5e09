//! Text-sync highlight driver
//!
//! Follows one audio output and keeps track of which timing segment covers
//! its current position. While the output plays the position is sampled once
//! per frame interval; pausing freezes the highlight, ending clears it.
//!
//! At most one output is followed at a time. Rebinding (a new output, new
//! segments, or none) tears down the previous follower task before the new
//! one starts, so a stale output can never move the highlight.

use crate::audio::{AudioOutput, OutputEvent};
use narrate_common::events::active_index;
use narrate_common::timing::{index_at, TimingSegment};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Observable highlight state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HighlightState {
    /// Segment covering the playback position; `-1` on the wire when none
    #[serde(with = "active_index")]
    pub active_index: Option<usize>,
    pub is_playing: bool,
}

/// The output currently followed and the task following it
struct OutputBinding {
    output: Arc<dyn AudioOutput>,
    task: JoinHandle<()>,
}

impl Drop for OutputBinding {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Maps an output's playback position onto timing segments
pub struct HighlightDriver {
    segments: Option<Arc<[TimingSegment]>>,
    frame_interval: Duration,
    state_tx: Arc<watch::Sender<HighlightState>>,
    binding: Option<OutputBinding>,
}

impl HighlightDriver {
    pub fn new(frame_interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(HighlightState::default());
        Self {
            segments: None,
            frame_interval: frame_interval.max(Duration::from_millis(1)),
            state_tx: Arc::new(state_tx),
            binding: None,
        }
    }

    /// Replace the timing segments; `None` disables highlighting
    pub fn set_segments(&mut self, segments: Option<Vec<TimingSegment>>) {
        self.segments = segments.map(Arc::from);
        let output = self.binding.as_ref().map(|b| Arc::clone(&b.output));
        self.bind_output(output);
    }

    pub fn segments(&self) -> Option<&[TimingSegment]> {
        self.segments.as_deref()
    }

    /// Follow `output`, or nothing
    pub fn bind_output(&mut self, output: Option<Arc<dyn AudioOutput>>) {
        // Old follower first
        self.binding = None;

        let Some(output) = output else {
            self.state_tx.send_replace(HighlightState::default());
            return;
        };

        let events = output.subscribe();
        let playing = output.is_playing();
        self.state_tx.send_replace(HighlightState {
            active_index: None,
            is_playing: playing,
        });

        let follower = Follower {
            output: Arc::clone(&output),
            segments: self.segments.clone(),
            state_tx: Arc::clone(&self.state_tx),
        };
        let task = tokio::spawn(follower.run(events, self.frame_interval, playing));
        debug!(
            segments = self.segments.as_ref().map(|s| s.len()),
            playing,
            "Highlight bound to output"
        );

        self.binding = Some(OutputBinding { output, task });
    }

    /// Current highlight
    pub fn state(&self) -> HighlightState {
        *self.state_tx.borrow()
    }

    /// Receiver notified whenever the highlight changes
    pub fn subscribe(&self) -> watch::Receiver<HighlightState> {
        self.state_tx.subscribe()
    }
}

struct Follower {
    output: Arc<dyn AudioOutput>,
    segments: Option<Arc<[TimingSegment]>>,
    state_tx: Arc<watch::Sender<HighlightState>>,
}

impl Follower {
    async fn run(
        self,
        mut events: broadcast::Receiver<OutputEvent>,
        frame_interval: Duration,
        mut sampling: bool,
    ) {
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if sampling {
            self.sample();
        }

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(OutputEvent::Play) => {
                        sampling = true;
                        self.set_playing(true);
                        self.sample();
                        ticker.reset();
                    }
                    Ok(OutputEvent::Pause) => {
                        sampling = false;
                        self.set_playing(false);
                    }
                    Ok(OutputEvent::Ended) => {
                        sampling = false;
                        self.state_tx.send_if_modified(|state| {
                            let changed = *state != HighlightState::default();
                            *state = HighlightState::default();
                            changed
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Highlight follower lagged behind output events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = ticker.tick(), if sampling => self.sample(),
            }
        }
    }

    fn sample(&self) {
        let position = self.output.position().as_secs_f64();
        let index = self
            .segments
            .as_deref()
            .and_then(|segments| index_at(segments, position));

        self.state_tx.send_if_modified(|state| {
            if state.active_index == index {
                return false;
            }
            trace!(position, ?index, "Highlight moved");
            state.active_index = index;
            true
        });
    }

    fn set_playing(&self, playing: bool) {
        self.state_tx.send_if_modified(|state| {
            let changed = state.is_playing != playing;
            state.is_playing = playing;
            changed
        });
    }
}
