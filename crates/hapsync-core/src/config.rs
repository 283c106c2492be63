//! Application configuration
//!
//! Credentials and endpoints for the device API plus the loop tunables,
//! loaded from a JSON file in the working directory. Tunables have defaults;
//! credentials and endpoints must be configured before a session can start.

use crate::device::client::ApiGeneration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration filename, resolved against the working directory
pub const CONFIG_FILE: &str = "hapsync_config.json";

/// Default pause ledger filename
pub const LEDGER_FILE: &str = "pause_ledger.json";

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

fn default_sync_probes() -> usize {
    crate::DEFAULT_SYNC_PROBES
}

fn default_coordinator_poll_ms() -> u64 {
    crate::DEFAULT_COORDINATOR_POLL_MS
}

fn default_input_poll_ms() -> u64 {
    crate::DEFAULT_INPUT_POLL_MS
}

fn default_vlc_binary() -> String {
    "vlc".to_string()
}

fn default_vlc_http_port() -> u16 {
    8937
}

fn default_vlc_http_password() -> String {
    "hapsync".to_string()
}

/// Errors loading the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no configuration found at {0}; create it before starting a session")]
    NotFound(PathBuf),

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("config is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Persistent application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Device connection key (required)
    #[serde(default)]
    pub connection_key: String,
    /// Application credential sent as the bearer token (required)
    #[serde(default)]
    pub app_id: String,
    /// Base URL of the device control API (required)
    #[serde(default)]
    pub api_base_url: String,
    /// URL of the script hosting endpoint (required)
    #[serde(default)]
    pub upload_url: String,
    /// Device API wire generation
    #[serde(default)]
    pub api_generation: ApiGeneration,
    /// Directory holding `<name>.mp4` and `<name>.motion` pairs
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    /// Clock probes per synchronization pass
    #[serde(default = "default_sync_probes")]
    pub sync_probes: usize,
    /// Coordination loop polling interval
    #[serde(default = "default_coordinator_poll_ms")]
    pub coordinator_poll_ms: u64,
    /// Input loop polling interval
    #[serde(default = "default_input_poll_ms")]
    pub input_poll_ms: u64,
    /// Player binary to launch
    #[serde(default = "default_vlc_binary")]
    pub vlc_binary: String,
    /// Port for the player's HTTP interface (localhost only)
    #[serde(default = "default_vlc_http_port")]
    pub vlc_http_port: u16,
    /// Password for the player's HTTP interface
    #[serde(default = "default_vlc_http_password")]
    pub vlc_http_password: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connection_key: String::new(),
            app_id: String::new(),
            api_base_url: String::new(),
            upload_url: String::new(),
            api_generation: ApiGeneration::default(),
            media_dir: default_media_dir(),
            sync_probes: default_sync_probes(),
            coordinator_poll_ms: default_coordinator_poll_ms(),
            input_poll_ms: default_input_poll_ms(),
            vlc_binary: default_vlc_binary(),
            vlc_http_port: default_vlc_http_port(),
            vlc_http_password: default_vlc_http_password(),
        }
    }
}

impl AppConfig {
    /// Load and validate the configuration at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        tracing::info!(path = %path.display(), generation = ?config.api_generation, "Loaded configuration");
        Ok(config)
    }

    /// Check the required credential and endpoint fields are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_key.is_empty() {
            return Err(ConfigError::MissingField("connection_key"));
        }
        if self.app_id.is_empty() {
            return Err(ConfigError::MissingField("app_id"));
        }
        if self.api_base_url.is_empty() {
            return Err(ConfigError::MissingField("api_base_url"));
        }
        if self.upload_url.is_empty() {
            return Err(ConfigError::MissingField("upload_url"));
        }
        Ok(())
    }

    /// Path of the video file for a media item
    pub fn video_path(&self, name: &str) -> PathBuf {
        self.media_dir.join(format!("{}.mp4", name))
    }

    /// Path of the motion script for a media item
    pub fn script_path(&self, name: &str) -> PathBuf {
        self.media_dir.join(format!("{}.motion", name))
    }
}
