//! Configuration file discovery and audio root resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NARRATE_CONFIG";

/// Environment variable naming the audio root folder
pub const AUDIO_ROOT_ENV_VAR: &str = "NARRATE_AUDIO_ROOT";

/// Audio root resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file value
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_audio_root(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_audio_root()
}

/// Locate the configuration file.
///
/// An explicit path wins and must exist. Otherwise the platform config
/// directory (`<config_dir>/narrate/config.toml`) is tried, then
/// `/etc/narrate/config.toml` on Linux. `Ok(None)` means no file was found,
/// which is not an error: callers fall back to defaults.
pub fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("narrate").join("config.toml")) {
        if user_config.exists() {
            return Ok(Some(user_config));
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/narrate/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }
    }

    Ok(None)
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    debug!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

/// Get OS-dependent default audio root path
pub fn default_audio_root() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/narrate/audio (or /var/lib/narrate/audio system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("narrate").join("audio"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/narrate/audio"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("narrate").join("audio"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/narrate/audio"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("narrate").join("audio"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\narrate\\audio"))
    } else {
        PathBuf::from("./narrate_data/audio")
    }
}
