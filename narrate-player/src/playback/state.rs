//! Observable playback state
//!
//! Snapshots published by the scheduler after every event it processes.

use narrate_common::events::active_index;
use narrate_common::StreamState;
use serde::Serialize;

/// A received sentence as shown to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentenceInfo {
    pub index: usize,
    pub text: String,
    pub wav_path: String,
    pub duration_secs: f64,
    /// Audio resolved and playable
    pub ready: bool,
}

/// Streaming playback status
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct PlayerStatus {
    pub job_id: Option<String>,
    pub state: StreamState,
    /// Chunk currently sounding or awaited; `-1` on the wire when none
    #[serde(with = "active_index")]
    pub active_index: Option<usize>,
    pub total_expected: usize,
    pub sentences: Vec<SentenceInfo>,
    pub is_playing: bool,
    pub is_buffering: bool,
    /// Buffering on a chunk whose audio could not be resolved
    pub stalled: bool,
}

impl PlayerStatus {
    /// Status with no job selected
    pub fn idle() -> Self {
        Self::default()
    }
}
