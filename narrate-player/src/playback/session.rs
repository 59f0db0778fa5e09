//! Streaming playback session state machine
//!
//! A [`PlaybackSession`] holds the bookkeeping for one job id and decides
//! every transition between buffering, playing, paused and complete. It never
//! touches audio itself: each handler returns the [`Effect`]s the scheduler
//! must carry out (resolve a reference, start/pause/resume/stop the output).
//! Keeping the machine synchronous makes its ordering rules testable without
//! a runtime.
//!
//! Ordering rules:
//! - chunks play strictly by ascending index, whatever the arrival order;
//! - the initial start fires once, when `buffer_threshold` chunks are ready
//!   or every expected chunk has been received, and at least one is ready;
//! - when the next chunk is missing at the end of the current one, the
//!   session advances to the missing index and buffers until it is ready.

use crate::audio::AudioHandle;
use crate::error::ResolveError;
use crate::playback::chunk_buffer::{ChunkBuffer, ChunkDescriptor};
use crate::playback::state::{PlayerStatus, SentenceInfo};
use narrate_common::{SentenceAudioEvent, StreamState};
use tracing::{debug, info, warn};

/// Side effects requested by the session
#[derive(Debug, Clone)]
pub enum Effect {
    /// Resolve `reference` for chunk `index`
    Resolve { index: usize, reference: String },
    /// Tear down any current output and start `handle` for chunk `index`
    Start { index: usize, handle: AudioHandle },
    /// Pause the current output
    Pause,
    /// Resume (or retry starting) the current output
    Resume,
    /// Tear down the current output
    Stop,
}

/// Result of offering a chunk-arrival notification to the session
#[derive(Debug)]
pub enum ArrivalOutcome {
    /// Belongs to a different job
    Ignored,
    /// Refused; the reason is logged and reported
    Rejected(String),
    /// Recorded
    Accepted(Vec<Effect>),
}

/// Bookkeeping for one streaming job
#[derive(Debug)]
pub struct PlaybackSession {
    job_id: String,
    generation: u64,
    buffer_threshold: usize,
    chunks: ChunkBuffer,
    active_index: Option<usize>,
    state: StreamState,
    total_expected: usize,
    play_started: bool,
    /// An output exists for `active_index` (sounding or paused)
    output_live: bool,
    /// The environment refused to start the current output
    start_rejected: bool,
}

impl PlaybackSession {
    /// New session in `buffering`
    pub fn new(job_id: impl Into<String>, generation: u64, buffer_threshold: usize) -> Self {
        Self {
            job_id: job_id.into(),
            generation,
            buffer_threshold: buffer_threshold.max(1),
            chunks: ChunkBuffer::new(),
            active_index: None,
            state: StreamState::Buffering,
            total_expected: 0,
            play_started: false,
            output_live: false,
            start_rejected: false,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Identifies this session among all sessions the scheduler created
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    /// Producer's total, `0` until learned
    pub fn total_expected(&self) -> usize {
        self.total_expected
    }

    pub fn chunks(&self) -> &ChunkBuffer {
        &self.chunks
    }

    /// Record a chunk-arrival notification
    pub fn on_chunk_arrived(&mut self, event: &SentenceAudioEvent) -> ArrivalOutcome {
        if event.job_id != self.job_id {
            return ArrivalOutcome::Ignored;
        }

        if self.total_expected == 0 {
            self.total_expected = event.total;
        } else if event.total != self.total_expected {
            warn!(
                job_id = %self.job_id,
                index = event.index,
                claimed = event.total,
                expected = self.total_expected,
                "Ignoring revised total; the first claim stands"
            );
        }

        if self.total_expected > 0 && event.index >= self.total_expected {
            let reason = format!(
                "index {} is outside the expected total of {}",
                event.index, self.total_expected
            );
            warn!(job_id = %self.job_id, "Rejecting chunk: {}", reason);
            return ArrivalOutcome::Rejected(reason);
        }

        let descriptor = ChunkDescriptor::from(event);
        let outcome = self.chunks.insert(descriptor);
        debug!(
            job_id = %self.job_id,
            index = event.index,
            ?outcome,
            received = self.chunks.received_count(),
            total = self.total_expected,
            "Chunk arrived"
        );

        let mut effects = Vec::new();
        if outcome.needs_resolution() {
            effects.push(Effect::Resolve {
                index: event.index,
                reference: event.wav_path.clone(),
            });
        }
        effects.extend(self.try_initial_start());
        ArrivalOutcome::Accepted(effects)
    }

    /// Record the outcome of resolving chunk `index`'s `reference`
    pub fn on_chunk_resolved(
        &mut self,
        index: usize,
        reference: &str,
        result: Result<AudioHandle, ResolveError>,
    ) -> Vec<Effect> {
        match result {
            Ok(handle) => {
                if !self.chunks.mark_ready(index, reference, handle) {
                    debug!(job_id = %self.job_id, index, "Discarding stale resolution");
                    return Vec::new();
                }
            }
            Err(e) => {
                if self.chunks.mark_failed(index, reference, e.clone()) {
                    warn!(
                        job_id = %self.job_id,
                        index,
                        "Chunk audio could not be resolved, playback will stall here: {}",
                        e
                    );
                }
                return Vec::new();
            }
        }

        if !self.play_started {
            return self.try_initial_start();
        }

        // Resume rule: the awaited chunk became ready
        if self.state == StreamState::Buffering && self.active_index == Some(index) {
            debug!(job_id = %self.job_id, index, "Awaited chunk ready, resuming");
            return self.start_active();
        }

        Vec::new()
    }

    /// The current output reached its natural end
    pub fn on_output_ended(&mut self) -> Vec<Effect> {
        if !self.output_live
            || !matches!(self.state, StreamState::Playing | StreamState::Paused)
        {
            return Vec::new();
        }
        let Some(current) = self.active_index else {
            return Vec::new();
        };
        self.output_live = false;
        let next = current + 1;
        let finished = self.total_expected > 0 && next >= self.total_expected;

        if self.state == StreamState::Paused {
            // Ended just before the pause took effect: move on, stay paused
            if finished {
                self.state = StreamState::Complete;
                self.active_index = None;
            } else {
                self.active_index = Some(next);
            }
            return vec![Effect::Stop];
        }

        if self.chunks.is_ready(next) {
            self.active_index = Some(next);
            return self.start_active();
        }

        if finished {
            info!(job_id = %self.job_id, "All {} chunks played", self.total_expected);
            self.state = StreamState::Complete;
            self.active_index = None;
            return vec![Effect::Stop];
        }

        debug!(job_id = %self.job_id, index = next, "Next chunk not ready, buffering");
        self.active_index = Some(next);
        self.state = StreamState::Buffering;
        vec![Effect::Stop]
    }

    /// Explicit pause request
    pub fn pause(&mut self) -> Vec<Effect> {
        match self.state {
            StreamState::Playing => {
                self.state = StreamState::Paused;
                if self.output_live {
                    vec![Effect::Pause]
                } else {
                    Vec::new()
                }
            }
            // Stalled mid-stream: pausing keeps the awaited chunk from
            // auto-starting when it arrives
            StreamState::Buffering if self.play_started => {
                self.state = StreamState::Paused;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Explicit play request: resume, replay after completion, or retry a
    /// start the environment refused
    pub fn play(&mut self) -> Vec<Effect> {
        match self.state {
            StreamState::Paused if self.output_live => {
                self.state = StreamState::Playing;
                vec![Effect::Resume]
            }
            StreamState::Paused => {
                if self.active_index.is_some_and(|i| self.chunks.is_ready(i)) {
                    self.start_active()
                } else {
                    self.state = StreamState::Buffering;
                    Vec::new()
                }
            }
            StreamState::Complete => {
                info!(job_id = %self.job_id, "Replaying from the first chunk");
                self.active_index = Some(0);
                if self.chunks.is_ready(0) {
                    self.start_active()
                } else {
                    self.state = StreamState::Buffering;
                    Vec::new()
                }
            }
            StreamState::Playing if self.start_rejected && self.output_live => {
                debug!(job_id = %self.job_id, "Retrying refused output start");
                vec![Effect::Resume]
            }
            _ => Vec::new(),
        }
    }

    /// The environment refused to start or resume the output
    pub fn on_start_rejected(&mut self) {
        self.start_rejected = true;
    }

    /// The output started or resumed successfully
    pub fn on_start_accepted(&mut self) {
        self.start_rejected = false;
    }

    /// Release the output when the session is discarded
    pub fn teardown(&mut self) -> Vec<Effect> {
        let live = self.output_live;
        self.output_live = false;
        if live {
            vec![Effect::Stop]
        } else {
            Vec::new()
        }
    }

    /// Observable snapshot
    pub fn status(&self) -> PlayerStatus {
        let sentences = self
            .chunks
            .iter()
            .map(|(descriptor, ready)| SentenceInfo {
                index: descriptor.index,
                text: descriptor.text.clone(),
                wav_path: descriptor.audio_ref.clone(),
                duration_secs: descriptor.duration_secs,
                ready,
            })
            .collect();

        let stalled = self.state == StreamState::Buffering
            && self.active_index.is_some_and(|i| self.chunks.has_failed(i));

        PlayerStatus {
            job_id: Some(self.job_id.clone()),
            state: self.state,
            active_index: self.active_index,
            total_expected: self.total_expected,
            sentences,
            is_playing: self.state == StreamState::Playing,
            is_buffering: self.state == StreamState::Buffering,
            stalled,
        }
    }

    fn try_initial_start(&mut self) -> Vec<Effect> {
        if self.play_started || self.state != StreamState::Buffering {
            return Vec::new();
        }

        let ready = self.chunks.ready_count();
        let all_received =
            self.total_expected > 0 && self.chunks.received_count() >= self.total_expected;
        if ready == 0 || (ready < self.buffer_threshold && !all_received) {
            return Vec::new();
        }

        info!(
            job_id = %self.job_id,
            ready,
            received = self.chunks.received_count(),
            total = self.total_expected,
            "Buffer filled, starting playback"
        );
        self.play_started = true;
        self.active_index = Some(0);
        if self.chunks.is_ready(0) {
            self.start_active()
        } else {
            debug!(job_id = %self.job_id, "Waiting for chunk 0 to become ready");
            Vec::new()
        }
    }

    fn start_active(&mut self) -> Vec<Effect> {
        let Some(index) = self.active_index else {
            return Vec::new();
        };
        let Some(handle) = self.chunks.handle(index).cloned() else {
            return Vec::new();
        };
        self.state = StreamState::Playing;
        self.output_live = true;
        self.start_rejected = false;
        vec![Effect::Start { index, handle }]
    }
}
