//! Event types for the narrate event system
//!
//! Two families live here:
//! - [`SentenceAudioEvent`]: the chunk-arrival notification emitted by the
//!   generation pipeline, one per synthesized sentence.
//! - [`NarrateEvent`]: state changes broadcast to observers (SSE clients).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serde adapter rendering `Option<usize>` indices as `-1` when absent
///
/// Observers of the playback state expect an integer index with `-1` meaning
/// "no active segment or chunk"; in Rust the same value is `None`.
pub mod active_index {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(index: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
        match index {
            Some(i) => serializer.serialize_u64(*i as u64),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(usize::try_from(raw).ok())
    }
}

/// Streaming playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// No job selected
    #[default]
    Idle,
    /// Waiting for chunks (initial fill, or the next chunk has not arrived)
    Buffering,
    /// One chunk is sounding
    Playing,
    /// Explicitly paused by the listener
    Paused,
    /// Every expected chunk has been played
    Complete,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Idle => write!(f, "idle"),
            StreamState::Buffering => write!(f, "buffering"),
            StreamState::Playing => write!(f, "playing"),
            StreamState::Paused => write!(f, "paused"),
            StreamState::Complete => write!(f, "complete"),
        }
    }
}

/// One synthesized sentence announced by the generation pipeline
///
/// Arrival order is not guaranteed to match `index` order. `total` is the
/// producer's claim of how many sentences the job will emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceAudioEvent {
    pub job_id: String,
    pub index: usize,
    pub total: usize,
    pub text: String,
    /// Opaque audio reference, in practice a WAV file path
    pub wav_path: String,
    pub duration_secs: f64,
}

/// Narrate event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NarrateEvent {
    /// Streaming playback state changed
    StreamStateChanged {
        job_id: Option<String>,
        state: StreamState,
        #[serde(with = "active_index")]
        active_index: Option<usize>,
        timestamp: DateTime<Utc>,
    },

    /// A chunk's audio started sounding
    SentenceStarted {
        job_id: String,
        index: usize,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A new job replaced (or cleared) the previous session
    SessionReset {
        job_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A chunk-arrival notification was refused
    ChunkRejected {
        job_id: String,
        index: usize,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Highlighted segment of a continuous narration changed
    HighlightChanged {
        #[serde(with = "active_index")]
        active_index: Option<usize>,
        is_playing: bool,
        timestamp: DateTime<Utc>,
    },
}

impl NarrateEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            NarrateEvent::StreamStateChanged { .. } => "StreamStateChanged",
            NarrateEvent::SentenceStarted { .. } => "SentenceStarted",
            NarrateEvent::SessionReset { .. } => "SessionReset",
            NarrateEvent::ChunkRejected { .. } => "ChunkRejected",
            NarrateEvent::HighlightChanged { .. } => "HighlightChanged",
        }
    }
}
