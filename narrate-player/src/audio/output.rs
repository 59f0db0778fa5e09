//! Physical audio outputs
//!
//! An [`AudioOutput`] plays one resolved handle. Observers learn about
//! transitions through [`OutputEvent`]s; the scheduler listens for `Ended` to
//! advance, the highlight driver listens for all three.
//!
//! [`ClockOutput`] is the shipped implementation: it advances a clock for the
//! handle's duration on the tokio timer, so position, pause/resume and
//! natural end behave like a device-backed sink without owning a device.

use crate::audio::resolver::AudioHandle;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Output lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// Playback started or resumed
    Play,
    /// Playback paused
    Pause,
    /// Reached the natural end of the audio
    Ended,
}

/// One physical audio output bound to one handle
pub trait AudioOutput: Send + Sync {
    /// Start, or resume from the paused position.
    ///
    /// An error means the environment refused to start playback (for example
    /// an autoplay policy); the output stays paused and may be retried.
    fn play(&self) -> Result<()>;

    /// Pause, keeping the position
    fn pause(&self);

    /// Halt for good without emitting `Ended`
    fn stop(&self);

    /// Current playback position
    fn position(&self) -> Duration;

    fn is_playing(&self) -> bool;

    /// Receive subsequent lifecycle events
    fn subscribe(&self) -> broadcast::Receiver<OutputEvent>;
}

/// Opens outputs for resolved handles
pub trait OutputFactory: Send + Sync {
    fn open(&self, handle: &AudioHandle) -> Arc<dyn AudioOutput>;
}

#[derive(Debug)]
struct ClockInner {
    elapsed: Duration,
    started_at: Option<Instant>,
    /// Incremented on every start; a timer only fires for its own run
    run: u64,
    timer: Option<JoinHandle<()>>,
    stopped: bool,
}

impl ClockInner {
    fn position(&self, duration: Duration) -> Duration {
        let running = self.started_at.map(|s| s.elapsed()).unwrap_or_default();
        (self.elapsed + running).min(duration)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Timer-driven output honouring the handle's duration
#[derive(Debug)]
pub struct ClockOutput {
    duration: Duration,
    inner: Arc<Mutex<ClockInner>>,
    events: broadcast::Sender<OutputEvent>,
}

impl ClockOutput {
    pub fn new(duration: Duration) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            duration,
            inner: Arc::new(Mutex::new(ClockInner {
                elapsed: Duration::ZERO,
                started_at: None,
                run: 0,
                timer: None,
                stopped: false,
            })),
            events,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockInner> {
        // A poisoned clock is still a valid clock
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AudioOutput for ClockOutput {
    fn play(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.stopped {
            return Err(Error::AudioOutput("output has been stopped".to_string()));
        }
        if inner.started_at.is_some() {
            return Ok(());
        }
        if inner.elapsed >= self.duration {
            // Playing a finished output starts it over
            inner.elapsed = Duration::ZERO;
        }

        inner.run += 1;
        let run = inner.run;
        let remaining = self.duration - inner.elapsed;
        inner.started_at = Some(Instant::now());

        let shared = Arc::clone(&self.inner);
        let events = self.events.clone();
        let duration = self.duration;
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            {
                let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
                if inner.run != run || inner.started_at.is_none() {
                    return;
                }
                inner.elapsed = duration;
                inner.started_at = None;
                inner.timer = None;
            }
            trace!("Clock output reached end");
            let _ = events.send(OutputEvent::Ended);
        }));
        drop(inner);

        let _ = self.events.send(OutputEvent::Play);
        Ok(())
    }

    fn pause(&self) {
        let mut inner = self.lock();
        let Some(started_at) = inner.started_at.take() else {
            return;
        };
        inner.elapsed = (inner.elapsed + started_at.elapsed()).min(self.duration);
        inner.cancel_timer();
        drop(inner);

        let _ = self.events.send(OutputEvent::Pause);
    }

    fn stop(&self) {
        let mut inner = self.lock();
        if let Some(started_at) = inner.started_at.take() {
            inner.elapsed = (inner.elapsed + started_at.elapsed()).min(self.duration);
        }
        inner.cancel_timer();
        inner.stopped = true;
    }

    fn position(&self) -> Duration {
        self.lock().position(self.duration)
    }

    fn is_playing(&self) -> bool {
        self.lock().started_at.is_some()
    }

    fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.events.subscribe()
    }
}

impl Drop for ClockOutput {
    fn drop(&mut self) {
        self.lock().cancel_timer();
    }
}

/// Factory producing [`ClockOutput`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockOutputFactory;

impl OutputFactory for ClockOutputFactory {
    fn open(&self, handle: &AudioHandle) -> Arc<dyn AudioOutput> {
        Arc::new(ClockOutput::new(handle.duration()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_plays_to_natural_end() {
        let output = ClockOutput::new(Duration::from_secs(2));
        let mut events = output.subscribe();

        output.play().unwrap();
        assert_eq!(events.recv().await.unwrap(), OutputEvent::Play);
        assert!(output.is_playing());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(output.position(), Duration::from_millis(500));

        assert_eq!(events.recv().await.unwrap(), OutputEvent::Ended);
        assert!(!output.is_playing());
        assert_eq!(output.position(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_keeps_position_and_resume_continues() {
        let output = ClockOutput::new(Duration::from_secs(2));
        let mut events = output.subscribe();

        output.play().unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        output.pause();
        assert_eq!(output.position(), Duration::from_millis(1500));

        // Paused: no end even well past the duration
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(output.position(), Duration::from_millis(1500));

        output.play().unwrap();
        let start = Instant::now();
        let received: Vec<OutputEvent> = vec![
            events.recv().await.unwrap(),
            events.recv().await.unwrap(),
            events.recv().await.unwrap(),
            events.recv().await.unwrap(),
        ];
        assert_eq!(
            received,
            vec![
                OutputEvent::Play,
                OutputEvent::Pause,
                OutputEvent::Play,
                OutputEvent::Ended
            ]
        );
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_suppresses_end_and_refuses_play() {
        let output = ClockOutput::new(Duration::from_secs(1));
        let mut events = output.subscribe();

        output.play().unwrap();
        output.stop();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(events.recv().await.unwrap(), OutputEvent::Play);
        assert!(events.try_recv().is_err());
        assert!(output.play().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_after_end_restarts() {
        let output = ClockOutput::new(Duration::from_millis(100));
        let mut events = output.subscribe();

        output.play().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(output.position(), Duration::from_millis(100));

        output.play().unwrap();
        assert_eq!(output.position(), Duration::ZERO);
        assert_eq!(events.recv().await.unwrap(), OutputEvent::Play);
        assert_eq!(events.recv().await.unwrap(), OutputEvent::Ended);
        assert_eq!(events.recv().await.unwrap(), OutputEvent::Play);
    }

    #[tokio::test(start_paused = true)]
    async fn test_factory_uses_handle_duration() {
        let handle = AudioHandle::new("a.wav", Duration::from_millis(750));
        let output = ClockOutputFactory.open(&handle);
        output.play().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(output.position(), Duration::from_millis(750));
        assert!(!output.is_playing());
    }
}
