//! Timing maps for text synchronization
//!
//! A finished narration asset `<part>_final.wav` may carry a sibling timing
//! resource `<part>_timing.json`: a JSON array of `{text, start, end}` triples
//! (seconds) describing which passage is spoken when.
//!
//! Assets generated before timing metadata existed have no such file. That is
//! a normal outcome, so every failure on the load path collapses to `None`
//! instead of an error.
//!
//! Segment lookup uses half-open intervals `[start, end)`: a timestamp belongs
//! to exactly one segment or to none.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Terminal suffix of a finished narration asset
pub const AUDIO_SUFFIX: &str = "_final.wav";

/// Terminal suffix of the sibling timing resource
pub const TIMING_SUFFIX: &str = "_timing.json";

/// One timed span of narration text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSegment {
    pub text: String,
    /// Start time in seconds (inclusive)
    pub start: f64,
    /// End time in seconds (exclusive)
    pub end: f64,
}

impl TimingSegment {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    /// True when `timestamp` falls inside `[start, end)`
    pub fn contains(&self, timestamp: f64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// Find the segment active at `timestamp` (seconds).
///
/// Returns `None` during gaps, before the first segment, at or after the last
/// segment's end, and for NaN timestamps. Linear scan; sequences are tens to
/// low hundreds of segments long and this runs once per display frame.
pub fn index_at(segments: &[TimingSegment], timestamp: f64) -> Option<usize> {
    segments.iter().position(|segment| segment.contains(timestamp))
}

/// Derive the timing resource path for an audio asset.
///
/// `/audio/part-1_final.wav` becomes `/audio/part-1_timing.json`. Paths that do
/// not end in [`AUDIO_SUFFIX`] have no timing resource.
pub fn timing_path_for(audio_path: &Path) -> Option<PathBuf> {
    let file_name = audio_path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(AUDIO_SUFFIX)?;
    Some(audio_path.with_file_name(format!("{stem}{TIMING_SUFFIX}")))
}

/// Parse raw timing JSON into a segment sequence.
///
/// Malformed JSON, non-finite times, or a segment ending before it starts all
/// yield `None`.
pub fn parse_segments(raw: &str) -> Option<Vec<TimingSegment>> {
    let segments: Vec<TimingSegment> = match serde_json::from_str(raw) {
        Ok(segments) => segments,
        Err(e) => {
            debug!("Timing data is not a segment sequence: {}", e);
            return None;
        }
    };

    for (i, segment) in segments.iter().enumerate() {
        if !segment.start.is_finite() || !segment.end.is_finite() || segment.end < segment.start {
            debug!(
                index = i,
                start = segment.start,
                end = segment.end,
                "Rejecting timing data with invalid segment bounds"
            );
            return None;
        }
    }

    if segments.windows(2).any(|pair| pair[1].start < pair[0].start) {
        warn!("Timing segments are not in chronological order");
    }

    Some(segments)
}

/// Reads raw timing resources
#[async_trait]
pub trait TimingSource: Send + Sync {
    /// Read the resource at `path` as UTF-8 text
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String>;
}

/// Timing source backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTimingSource;

#[async_trait]
impl TimingSource for FsTimingSource {
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// Loads timing maps for narration assets
#[derive(Clone)]
pub struct TimingStore {
    source: Arc<dyn TimingSource>,
}

impl TimingStore {
    pub fn new(source: Arc<dyn TimingSource>) -> Self {
        Self { source }
    }

    /// Timing store reading from the local filesystem
    pub fn filesystem() -> Self {
        Self::new(Arc::new(FsTimingSource))
    }

    /// Load the timing map for `audio_path`.
    ///
    /// `None` when the path does not follow the asset naming convention (no
    /// read is attempted), or when the resource is absent, unreadable or
    /// malformed.
    pub async fn load(&self, audio_path: &Path) -> Option<Vec<TimingSegment>> {
        let timing_path = timing_path_for(audio_path)?;

        let raw = match self.source.read_to_string(&timing_path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(
                    "No timing data at {} ({}), treating as legacy asset",
                    timing_path.display(),
                    e
                );
                return None;
            }
        };

        let segments = parse_segments(&raw)?;
        debug!(
            "Loaded {} timing segments from {}",
            segments.len(),
            timing_path.display()
        );
        Some(segments)
    }
}

impl std::fmt::Debug for TimingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingStore").finish_non_exhaustive()
    }
}
