//! # Narrate Common Library
//!
//! Shared code for the narrate crates:
//! - Event types (chunk arrival, `NarrateEvent`, `StreamState`)
//! - Timing maps and segment lookup for text synchronization
//! - Configuration file discovery
//! - Error types and timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod timing;

pub use error::{Error, Result};
pub use events::{NarrateEvent, SentenceAudioEvent, StreamState};
pub use timing::{index_at, TimingSegment, TimingStore};
