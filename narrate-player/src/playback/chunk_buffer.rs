//! Chunk buffer for streamed sentences
//!
//! Chunks are keyed by their ordinal index, so arrival order does not matter:
//! the scheduler always looks chunks up by the index it wants to play next.
//! A chunk is *received* once its descriptor is recorded and *ready* once its
//! audio reference has been resolved into a handle.

use crate::audio::AudioHandle;
use crate::error::ResolveError;
use narrate_common::SentenceAudioEvent;
use std::collections::BTreeMap;

/// One synthesized sentence as announced by the producer
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDescriptor {
    pub index: usize,
    pub text: String,
    pub audio_ref: String,
    pub duration_secs: f64,
    pub total_expected: usize,
}

impl From<&SentenceAudioEvent> for ChunkDescriptor {
    fn from(event: &SentenceAudioEvent) -> Self {
        Self {
            index: event.index,
            text: event.text.clone(),
            audio_ref: event.wav_path.clone(),
            duration_secs: event.duration_secs,
            total_expected: event.total,
        }
    }
}

#[derive(Debug, Clone)]
enum Readiness {
    Pending,
    Ready(AudioHandle),
    Failed(ResolveError),
}

#[derive(Debug, Clone)]
struct ChunkEntry {
    descriptor: ChunkDescriptor,
    readiness: Readiness,
}

/// What recording a descriptor changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First descriptor for this index; needs resolution
    New,
    /// Same index, different audio reference; needs resolution again
    Replaced,
    /// Same index and reference whose earlier resolution failed; retry
    Retry,
    /// Same index and reference, already resolved or resolving
    Unchanged,
}

impl InsertOutcome {
    /// Whether the caller must start resolving the chunk's reference
    pub fn needs_resolution(self) -> bool {
        !matches!(self, InsertOutcome::Unchanged)
    }
}

/// Received chunks keyed by index
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    entries: BTreeMap<usize, ChunkEntry>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a descriptor. A repeated index is last-write-wins for its
    /// metadata; an already resolved handle is kept while the reference is
    /// unchanged.
    pub fn insert(&mut self, descriptor: ChunkDescriptor) -> InsertOutcome {
        let index = descriptor.index;
        match self.entries.get_mut(&index) {
            None => {
                self.entries.insert(
                    index,
                    ChunkEntry {
                        descriptor,
                        readiness: Readiness::Pending,
                    },
                );
                InsertOutcome::New
            }
            Some(entry) if entry.descriptor.audio_ref != descriptor.audio_ref => {
                entry.descriptor = descriptor;
                entry.readiness = Readiness::Pending;
                InsertOutcome::Replaced
            }
            Some(entry) => {
                entry.descriptor = descriptor;
                if matches!(entry.readiness, Readiness::Failed(_)) {
                    entry.readiness = Readiness::Pending;
                    InsertOutcome::Retry
                } else {
                    InsertOutcome::Unchanged
                }
            }
        }
    }

    /// Attach a resolved handle. Returns false when the index is unknown or
    /// its reference changed since resolution began (stale result).
    pub fn mark_ready(&mut self, index: usize, reference: &str, handle: AudioHandle) -> bool {
        match self.entries.get_mut(&index) {
            Some(entry) if entry.descriptor.audio_ref == reference => {
                entry.readiness = Readiness::Ready(handle);
                true
            }
            _ => false,
        }
    }

    /// Record a resolution failure; same staleness rule as [`Self::mark_ready`]
    pub fn mark_failed(&mut self, index: usize, reference: &str, error: ResolveError) -> bool {
        match self.entries.get_mut(&index) {
            Some(entry) if entry.descriptor.audio_ref == reference => {
                entry.readiness = Readiness::Failed(error);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&ChunkDescriptor> {
        self.entries.get(&index).map(|entry| &entry.descriptor)
    }

    /// Resolved handle for `index`, if ready
    pub fn handle(&self, index: usize) -> Option<&AudioHandle> {
        match self.entries.get(&index) {
            Some(ChunkEntry {
                readiness: Readiness::Ready(handle),
                ..
            }) => Some(handle),
            _ => None,
        }
    }

    pub fn is_ready(&self, index: usize) -> bool {
        self.handle(index).is_some()
    }

    pub fn has_failed(&self, index: usize) -> bool {
        matches!(
            self.entries.get(&index),
            Some(ChunkEntry {
                readiness: Readiness::Failed(_),
                ..
            })
        )
    }

    /// Number of distinct indices received
    pub fn received_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of chunks with a resolved handle
    pub fn ready_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| matches!(entry.readiness, Readiness::Ready(_)))
            .count()
    }

    /// Descriptors in ascending index order, with their readiness
    pub fn iter(&self) -> impl Iterator<Item = (&ChunkDescriptor, bool)> {
        self.entries
            .values()
            .map(|entry| (&entry.descriptor, matches!(entry.readiness, Readiness::Ready(_))))
    }
}
