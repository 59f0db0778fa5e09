//! Configuration for narrate-player
//!
//! Bootstrap settings come from a TOML file; command-line arguments and
//! environment variables override individual values in `main`. Every field
//! has a built-in default, so a missing file is not fatal.

use crate::error::{Error, Result};
use narrate_common::config::{load_toml, locate_config_file};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Chunks that must be ready before streaming playback starts
pub const DEFAULT_BUFFER_THRESHOLD: usize = 5;

/// Highlight sampling period (one display frame at ~60 Hz)
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Folder against which relative audio references are resolved
    #[serde(default)]
    pub audio_root: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub playback: PlaybackSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Streaming playback tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackSettings {
    /// Ready chunks needed before the first chunk plays
    #[serde(default = "default_buffer_threshold")]
    pub buffer_threshold: usize,

    /// Highlight sampling period in milliseconds
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_port() -> u16 {
    5750
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_buffer_threshold() -> usize {
    DEFAULT_BUFFER_THRESHOLD
}

fn default_frame_interval_ms() -> u64 {
    DEFAULT_FRAME_INTERVAL_MS
}

fn default_event_buffer() -> usize {
    100
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            buffer_threshold: default_buffer_threshold(),
            frame_interval_ms: default_frame_interval_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            audio_root: None,
            logging: LoggingConfig::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl PlaybackSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl TomlConfig {
    /// Load configuration, falling back to defaults when no file exists.
    ///
    /// An explicit path that does not exist, or any file that fails to parse
    /// or validate, is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match locate_config_file(explicit)? {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                load_toml::<TomlConfig>(&path)?
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                TomlConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.playback.buffer_threshold == 0 {
            return Err(Error::Config(
                "playback.buffer_threshold must be at least 1".to_string(),
            ));
        }
        if self.playback.frame_interval_ms == 0 {
            return Err(Error::Config(
                "playback.frame_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.playback.event_buffer == 0 {
            return Err(Error::Config(
                "playback.event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
