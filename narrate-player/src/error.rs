//! Error types for narrate-player
//!
//! Routine streaming conditions (missing timing data, a chunk that cannot be
//! resolved, a rejected output start, a superseded job) are encoded as
//! scheduler state, not as errors. The types here cover setup and control
//! failures.

use thiserror::Error;

/// Main error type for narrate-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio reference could not be turned into a playable handle
    #[error("Audio resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Audio output errors (including rejected starts)
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback control errors (scheduler task gone, nothing open)
    #[error("Playback error: {0}")]
    Playback(String),

    /// Errors bubbled up from the shared library
    #[error(transparent)]
    Common(#[from] narrate_common::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),
}

/// Why an audio reference could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Referenced file does not exist
    #[error("audio not found: {0}")]
    NotFound(String),

    /// Referenced file exists but could not be read
    #[error("failed to read {reference}: {message}")]
    Read { reference: String, message: String },

    /// Bytes are not a playable WAV stream
    #[error("failed to decode {reference}: {message}")]
    Decode { reference: String, message: String },
}

/// Convenience Result type using narrate-player Error
pub type Result<T> = std::result::Result<T, Error>;
