//! Shared service state
//!
//! Thread-safe state shared between the scheduler, the narration player and
//! the HTTP layer. The only cross-component channel is the event broadcaster
//! feeding SSE clients.

use narrate_common::events::NarrateEvent;
use tokio::sync::broadcast;

/// Default number of events buffered for slow SSE clients
pub const DEFAULT_EVENT_BUFFER: usize = 100;

/// Shared state accessible by all components
#[derive(Debug)]
pub struct SharedState {
    /// Event broadcaster for SSE events
    pub event_tx: broadcast::Sender<NarrateEvent>,
}

impl SharedState {
    /// Create shared state buffering up to `event_buffer` events per client
    pub fn new(event_buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));
        Self { event_tx }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: NarrateEvent) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to the event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<NarrateEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}
