//! Streaming playback scheduler
//!
//! Owns the current [`PlaybackSession`] and the single live audio output.
//! Everything that can change the session goes through one ordered command
//! queue processed by one task:
//!
//! - external requests (select job, chunk arrived, play, pause);
//! - completions of audio resolution, tagged with the session generation
//!   that requested them so results for a replaced job are dropped;
//! - natural ends of an output, tagged with the output's token so an end
//!   from an output that has since been replaced is dropped.
//!
//! After each command the scheduler publishes a [`PlayerStatus`] snapshot on
//! a watch channel and broadcasts [`NarrateEvent`]s for state changes.

use crate::audio::{AudioHandle, AudioOutput, AudioResolver, OutputEvent, OutputFactory};
use crate::error::{Error, ResolveError, Result};
use crate::playback::session::{ArrivalOutcome, Effect, PlaybackSession};
use crate::playback::state::PlayerStatus;
use crate::state::SharedState;
use narrate_common::events::{NarrateEvent, SentenceAudioEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Scheduler tuning
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Ready chunks required before the initial start
    pub buffer_threshold: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buffer_threshold: crate::config::DEFAULT_BUFFER_THRESHOLD,
        }
    }
}

enum Command {
    SetJob(Option<String>),
    ChunkArrived(SentenceAudioEvent),
    ChunkResolved {
        generation: u64,
        index: usize,
        reference: String,
        result: std::result::Result<AudioHandle, ResolveError>,
    },
    OutputEnded {
        token: u64,
    },
    Play,
    Pause,
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the scheduler task
///
/// The task exits once every handle has been dropped.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<PlayerStatus>,
}

impl SchedulerHandle {
    /// Select the job whose chunks should play; `None` clears the session
    pub fn set_job(&self, job_id: Option<String>) -> Result<()> {
        self.send(Command::SetJob(job_id))
    }

    /// Deliver a chunk-arrival notification
    pub fn chunk_arrived(&self, event: SentenceAudioEvent) -> Result<()> {
        self.send(Command::ChunkArrived(event))
    }

    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// Wait until every command sent before this call has been processed
    ///
    /// Resolutions spawned by those commands may still be in flight.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx))?;
        rx.await.map_err(|_| scheduler_stopped())
    }

    /// Latest published status
    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn watch_status(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| scheduler_stopped())
    }
}

fn scheduler_stopped() -> Error {
    Error::Playback("scheduler is not running".to_string())
}

struct LiveOutput {
    token: u64,
    output: Arc<dyn AudioOutput>,
    listener: JoinHandle<()>,
}

/// Start the scheduler task
pub fn spawn_scheduler(
    config: SchedulerConfig,
    resolver: Arc<dyn AudioResolver>,
    outputs: Arc<dyn OutputFactory>,
    state: Arc<SharedState>,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(PlayerStatus::idle());

    let scheduler = Scheduler {
        config,
        resolver,
        outputs,
        state,
        loopback: commands.downgrade(),
        status_tx,
        session: None,
        generation: 0,
        live: None,
        next_token: 0,
    };
    let task = tokio::spawn(scheduler.run(rx));

    (
        SchedulerHandle {
            commands,
            status: status_rx,
        },
        task,
    )
}

struct Scheduler {
    config: SchedulerConfig,
    resolver: Arc<dyn AudioResolver>,
    outputs: Arc<dyn OutputFactory>,
    state: Arc<SharedState>,
    /// Weak so the queue closes once every external handle is gone
    loopback: mpsc::WeakUnboundedSender<Command>,
    status_tx: watch::Sender<PlayerStatus>,
    session: Option<PlaybackSession>,
    generation: u64,
    live: Option<LiveOutput>,
    next_token: u64,
}

impl Scheduler {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!(
            buffer_threshold = self.config.buffer_threshold,
            "Playback scheduler started"
        );

        while let Some(command) = rx.recv().await {
            self.handle(command);
            self.publish();
        }

        self.stop_output();
        info!("Playback scheduler stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetJob(job_id) => self.set_job(job_id),
            Command::ChunkArrived(event) => self.chunk_arrived(event),
            Command::ChunkResolved {
                generation,
                index,
                reference,
                result,
            } => {
                if generation != self.generation {
                    trace!(generation, index, "Dropping resolution for replaced session");
                    return;
                }
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let effects = session.on_chunk_resolved(index, &reference, result);
                self.apply(effects);
            }
            Command::OutputEnded { token } => {
                if self.live.as_ref().map(|live| live.token) != Some(token) {
                    trace!(token, "Dropping end of replaced output");
                    return;
                }
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let effects = session.on_output_ended();
                self.apply(effects);
            }
            Command::Play => {
                let Some(session) = self.session.as_mut() else {
                    debug!("Play requested with no job selected");
                    return;
                };
                let effects = session.play();
                self.apply(effects);
            }
            Command::Pause => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let effects = session.pause();
                self.apply(effects);
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn set_job(&mut self, job_id: Option<String>) {
        let current = self.session.as_ref().map(|s| s.job_id());
        if current == job_id.as_deref() {
            return;
        }

        if let Some(mut old) = self.session.take() {
            let effects = old.teardown();
            self.apply_without_session(effects);
            self.release_chunks(&old);
        }
        self.stop_output();

        self.generation += 1;
        match &job_id {
            Some(id) => {
                info!(job_id = %id, generation = self.generation, "Starting new playback session");
                self.session = Some(PlaybackSession::new(
                    id.clone(),
                    self.generation,
                    self.config.buffer_threshold,
                ));
            }
            None => info!("Playback session cleared"),
        }

        self.state.broadcast_event(NarrateEvent::SessionReset {
            job_id,
            timestamp: narrate_common::time::now(),
        });
    }

    fn chunk_arrived(&mut self, event: SentenceAudioEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!(job_id = %event.job_id, index = event.index, "Chunk arrived with no job selected");
            return;
        };

        match session.on_chunk_arrived(&event) {
            ArrivalOutcome::Ignored => {
                debug!(
                    job_id = %event.job_id,
                    current = %session.job_id(),
                    index = event.index,
                    "Ignoring chunk for another job"
                );
            }
            ArrivalOutcome::Rejected(reason) => {
                self.state.broadcast_event(NarrateEvent::ChunkRejected {
                    job_id: event.job_id,
                    index: event.index,
                    reason,
                    timestamp: narrate_common::time::now(),
                });
            }
            ArrivalOutcome::Accepted(effects) => self.apply(effects),
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Resolve { index, reference } => self.spawn_resolution(index, reference),
                Effect::Start { index, handle } => self.start_output(index, &handle),
                Effect::Pause => {
                    if let Some(live) = &self.live {
                        live.output.pause();
                    }
                }
                Effect::Resume => self.resume_output(),
                Effect::Stop => self.stop_output(),
            }
        }
    }

    /// Effects of a session that is being discarded only touch the output
    fn apply_without_session(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            if let Effect::Stop = effect {
                self.stop_output();
            }
        }
    }

    /// Let the resolver drop what it holds for a discarded session's chunks
    fn release_chunks(&self, session: &PlaybackSession) {
        let references: Vec<String> = session
            .chunks()
            .iter()
            .map(|(chunk, _)| chunk.audio_ref.clone())
            .collect();
        if references.is_empty() {
            return;
        }
        let resolver = Arc::clone(&self.resolver);
        tokio::spawn(async move {
            debug!(count = references.len(), "Releasing audio of replaced session");
            resolver.release(&references).await;
        });
    }

    fn spawn_resolution(&self, index: usize, reference: String) {
        let Some(loopback) = self.loopback.upgrade() else {
            return;
        };
        let resolver = Arc::clone(&self.resolver);
        let generation = self.generation;

        tokio::spawn(async move {
            let result = resolver.resolve(&reference).await;
            if let Err(e) = &result {
                warn!(index, reference = %reference, "Audio resolution failed: {}", e);
            }
            let _ = loopback.send(Command::ChunkResolved {
                generation,
                index,
                reference,
                result,
            });
        });
    }

    fn start_output(&mut self, index: usize, handle: &AudioHandle) {
        self.stop_output();

        let output = self.outputs.open(handle);
        self.next_token += 1;
        let token = self.next_token;
        let listener = self.spawn_end_listener(token, output.subscribe());
        self.live = Some(LiveOutput {
            token,
            output: Arc::clone(&output),
            listener,
        });

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let text = session
            .chunks()
            .get(index)
            .map(|chunk| chunk.text.clone())
            .unwrap_or_default();
        info!(job_id = %session.job_id(), index, "Playing chunk");

        match output.play() {
            Ok(()) => session.on_start_accepted(),
            Err(e) => {
                warn!(index, "Output refused to start, waiting for play: {}", e);
                session.on_start_rejected();
            }
        }

        self.state.broadcast_event(NarrateEvent::SentenceStarted {
            job_id: session.job_id().to_string(),
            index,
            text,
            timestamp: narrate_common::time::now(),
        });
    }

    fn resume_output(&mut self) {
        let (Some(live), Some(session)) = (&self.live, self.session.as_mut()) else {
            return;
        };
        match live.output.play() {
            Ok(()) => session.on_start_accepted(),
            Err(e) => {
                warn!("Output refused to resume: {}", e);
                session.on_start_rejected();
            }
        }
    }

    fn spawn_end_listener(
        &self,
        token: u64,
        mut events: broadcast::Receiver<OutputEvent>,
    ) -> JoinHandle<()> {
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(OutputEvent::Ended) => {
                        if let Some(tx) = loopback.upgrade() {
                            let _ = tx.send(Command::OutputEnded { token });
                        }
                        return;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(token, skipped, "Output event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }

    fn stop_output(&mut self) {
        if let Some(live) = self.live.take() {
            live.listener.abort();
            live.output.stop();
            trace!(token = live.token, "Output released");
        }
    }

    fn publish(&mut self) {
        let status = match &self.session {
            Some(session) => session.status(),
            None => PlayerStatus::idle(),
        };

        let previous = self.status_tx.borrow().clone();
        if previous == status {
            return;
        }

        if previous.state != status.state
            || previous.active_index != status.active_index
            || previous.job_id != status.job_id
        {
            debug!(
                job_id = ?status.job_id,
                state = %status.state,
                active_index = ?status.active_index,
                "Stream state changed"
            );
            self.state.broadcast_event(NarrateEvent::StreamStateChanged {
                job_id: status.job_id.clone(),
                state: status.state,
                active_index: status.active_index,
                timestamp: narrate_common::time::now(),
            });
        }

        if status.stalled && !previous.stalled {
            error!(
                job_id = ?status.job_id,
                active_index = ?status.active_index,
                "Playback stalled on a chunk whose audio could not be resolved"
            );
        }

        self.status_tx.send_replace(status);
    }
}
