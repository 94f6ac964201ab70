//! Configuration resolution for Syncast.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/syncast/settings.json)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete Syncast configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8081,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Broadcast timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Seconds between issuing a play command and the scheduled start.
    pub delay_secs: u64,
    /// Upper bound on waiting for one client's send to complete.
    pub send_timeout_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            delay_secs: 5,
            send_timeout_secs: 30,
        }
    }
}

impl PlaybackConfig {
    pub const fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Where `play <name>` looks for media files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory holding media files. Defaults to the user's downloads folder.
    pub directory: Option<PathBuf>,
    /// Extension appended to the requested name.
    pub extension: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            directory: None,
            extension: "wav".to_string(),
        }
    }
}

impl MediaConfig {
    /// Configured directory, falling back to the downloads folder and then the
    /// current directory.
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Load configuration with hierarchical resolution.
///
/// `explicit_path` replaces the global config file when given; unlike the
/// global file it must exist.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    let mut config = match explicit_path {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(path) if path.exists() => load_config_file(&path)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("syncast").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("SYNCAST_BIND_ADDRESS") {
        config.server.bind_address = val;
    }
    if let Some(n) = var("SYNCAST_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = n;
    }
    if let Some(val) = var("SYNCAST_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(n) = var("SYNCAST_PLAY_DELAY_SECS").and_then(|v| v.parse().ok()) {
        config.playback.delay_secs = n;
    }
    if let Some(n) = var("SYNCAST_SEND_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.playback.send_timeout_secs = n;
    }
    if let Some(val) = var("SYNCAST_MEDIA_DIR") {
        config.media.directory = Some(PathBuf::from(val));
    }
    if let Some(val) = var("SYNCAST_MEDIA_EXTENSION") {
        config.media.extension = val;
    }
}
