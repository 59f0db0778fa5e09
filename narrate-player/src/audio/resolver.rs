//! Audio reference resolution
//!
//! Chunk-arrival notifications carry an opaque audio reference (a WAV path).
//! Before a chunk can play, its reference is resolved into an [`AudioHandle`]:
//! the bytes are loaded, validated as WAV, and their duration measured.
//!
//! Resolution results are cached per reference in a [`ResolverCache`] that is
//! constructed once by the application and shared by `Arc`. An entry is only
//! served while the file's length and modification time still match, and
//! owners release references they no longer need.

use crate::error::ResolveError;
use narrate_common::time::secs_to_duration;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::debug;

/// Playable audio resolved from a reference
#[derive(Debug, Clone)]
pub struct AudioHandle {
    reference: Arc<str>,
    duration: Duration,
}

impl AudioHandle {
    pub fn new(reference: impl Into<Arc<str>>, duration: Duration) -> Self {
        Self {
            reference: reference.into(),
            duration,
        }
    }

    /// Reference this handle was resolved from
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Turns audio references into playable handles
#[async_trait]
pub trait AudioResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<AudioHandle, ResolveError>;

    /// The caller no longer needs `references`; cached state may be dropped
    async fn release(&self, _references: &[String]) {}
}

/// File identity a cached resolution was measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl From<&std::fs::Metadata> for FileStamp {
    fn from(metadata: &std::fs::Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// Resolved handles keyed by reference
#[derive(Debug, Default)]
pub struct ResolverCache {
    entries: RwLock<HashMap<String, (FileStamp, AudioHandle)>>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for `reference`, if it was measured against `stamp`
    pub async fn get(&self, reference: &str, stamp: FileStamp) -> Option<AudioHandle> {
        match self.entries.read().await.get(reference) {
            Some((cached, handle)) if *cached == stamp => Some(handle.clone()),
            _ => None,
        }
    }

    pub async fn insert(&self, stamp: FileStamp, handle: AudioHandle) {
        self.entries
            .write()
            .await
            .insert(handle.reference().to_string(), (stamp, handle));
    }

    pub async fn remove(&self, references: &[String]) {
        let mut entries = self.entries.write().await;
        for reference in references {
            entries.remove(reference);
        }
    }
}

/// Resolves references to WAV files on the local filesystem
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: Option<PathBuf>,
    cache: Arc<ResolverCache>,
}

impl FileResolver {
    /// Create a resolver; relative references are joined onto `root`
    pub fn new(root: Option<PathBuf>, cache: Arc<ResolverCache>) -> Self {
        Self { root, cache }
    }

    fn path_for(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn io_error(reference: &str, e: std::io::Error) -> ResolveError {
    match e.kind() {
        std::io::ErrorKind::NotFound => ResolveError::NotFound(reference.to_string()),
        _ => ResolveError::Read {
            reference: reference.to_string(),
            message: e.to_string(),
        },
    }
}

#[async_trait]
impl AudioResolver for FileResolver {
    async fn resolve(&self, reference: &str) -> Result<AudioHandle, ResolveError> {
        let path = self.path_for(reference);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(reference, e))?;
        let stamp = FileStamp::from(&metadata);

        if let Some(handle) = self.cache.get(reference, stamp).await {
            return Ok(handle);
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(reference, e))?;

        let duration = wav_duration(&bytes).map_err(|message| ResolveError::Decode {
            reference: reference.to_string(),
            message,
        })?;

        debug!(
            "Resolved {} ({} bytes, {:.2}s)",
            path.display(),
            bytes.len(),
            duration.as_secs_f64()
        );

        let handle = AudioHandle::new(reference, duration);
        self.cache.insert(stamp, handle.clone()).await;
        Ok(handle)
    }

    async fn release(&self, references: &[String]) {
        self.cache.remove(references).await;
    }
}

/// Measure a WAV stream's duration from its header
fn wav_duration(bytes: &[u8]) -> Result<Duration, String> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let sample_rate = reader.spec().sample_rate;
    if sample_rate == 0 {
        return Err("sample rate is zero".to_string());
    }
    Ok(secs_to_duration(
        f64::from(reader.duration()) / f64::from(sample_rate),
    ))
}
