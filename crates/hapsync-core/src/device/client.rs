//! HTTP client for the remote device API
//!
//! All calls are blocking with explicit per-call timeouts, so a dead network
//! degrades to a failed probe or a skipped correction instead of hanging the
//! coordination loop. Credentials travel as a connection-key header plus a
//! bearer token on every request.

use crate::sync::clock::TimeSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Timeout for the time endpoint probe
const TIME_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the script upload (largest payload)
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the mode/setup calls
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for the play command
const PLAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the periodic correction command
const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the stop command
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Device-side timeout query parameter, in milliseconds. The device aborts a
/// command it cannot complete within this window.
const DEVICE_COMMAND_TIMEOUT_MS: u64 = 5000;

/// Errors that can occur talking to the device API
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("device API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("script file not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("script read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("device API response missing expected fields")]
    MalformedResponse,
}

/// Wire generation of the device API
///
/// Older firmware expects camelCase play payloads; current firmware uses
/// snake_case with an explicit playback rate and loop flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiGeneration {
    V3,
    V4,
}

impl Default for ApiGeneration {
    fn default() -> Self {
        ApiGeneration::V4
    }
}

/// Commands the coordinator issues against the device
pub trait DeviceControl {
    /// Upload a motion script and return the hosted URL the device will fetch
    fn upload_script(&self, path: &Path) -> Result<String, DeviceError>;

    /// Switch the device to scripted-playback mode and point it at the script
    fn setup(&self, script_url: &str) -> Result<(), DeviceError>;

    /// Start scripted playback at `position_ms` relative to the script origin
    fn play(&self, position_ms: i64, server_time_ms: i64) -> Result<(), DeviceError>;

    /// Re-align the device playhead without restarting the script
    fn sync_time(&self, position_ms: i64, server_time_ms: i64) -> Result<(), DeviceError>;

    /// Stop scripted playback (idempotent from the caller's perspective)
    fn stop(&self) -> Result<(), DeviceError>;
}

#[derive(Deserialize)]
struct ServerTimeResponse {
    server_time_ms: i64,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: Option<String>,
}

#[derive(Serialize)]
struct SetupRequest<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct PlayRequestV3 {
    #[serde(rename = "estimatedServerTime")]
    estimated_server_time: i64,
    #[serde(rename = "startTime")]
    start_time: i64,
}

#[derive(Serialize)]
struct PlayRequestV4 {
    start_time: i64,
    server_time: i64,
    playback_rate: f64,
    #[serde(rename = "loop")]
    looping: bool,
}

#[derive(Serialize)]
struct SyncTimeRequest {
    start_time: i64,
    server_time: i64,
}

/// Blocking HTTP client for the device API
pub struct HttpDeviceClient {
    client: reqwest::blocking::Client,
    api_base: String,
    upload_url: String,
    connection_key: String,
    app_id: String,
    generation: ApiGeneration,
}

impl HttpDeviceClient {
    pub fn new(
        api_base: impl Into<String>,
        upload_url: impl Into<String>,
        connection_key: impl Into<String>,
        app_id: impl Into<String>,
        generation: ApiGeneration,
    ) -> Result<Self, DeviceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(TIME_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            upload_url: upload_url.into(),
            connection_key: connection_key.into(),
            app_id: app_id.into(),
            generation,
        })
    }

    pub fn generation(&self) -> ApiGeneration {
        self.generation
    }

    fn authed(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        req.header("X-Connection-Key", &self.connection_key)
            .bearer_auth(&self.app_id)
    }

    fn command_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}?timeout={}",
            self.api_base, endpoint, DEVICE_COMMAND_TIMEOUT_MS
        )
    }

    /// Execute a request and surface non-2xx statuses as `DeviceError::Api`
    fn execute(
        &self,
        req: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response, DeviceError> {
        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(DeviceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

impl TimeSource for HttpDeviceClient {
    fn server_time_ms(&self) -> Result<i64, DeviceError> {
        let url = format!("{}/servertime", self.api_base);
        let resp = self.execute(self.client.get(&url).timeout(TIME_TIMEOUT))?;
        let parsed: ServerTimeResponse = resp.json().map_err(|_| DeviceError::MalformedResponse)?;
        Ok(parsed.server_time_ms)
    }
}

impl DeviceControl for HttpDeviceClient {
    fn upload_script(&self, path: &Path) -> Result<String, DeviceError> {
        if !path.exists() {
            return Err(DeviceError::ScriptNotFound(path.to_path_buf()));
        }

        let size = std::fs::metadata(path)?.len();
        tracing::info!(path = %path.display(), size, "Uploading motion script");

        let form = reqwest::blocking::multipart::Form::new().file("file", path)?;
        let resp = self.execute(
            self.client
                .post(&self.upload_url)
                .timeout(UPLOAD_TIMEOUT)
                .header("Accept", "application/json")
                .multipart(form),
        )?;

        let parsed: UploadResponse = resp.json().map_err(|_| DeviceError::MalformedResponse)?;
        let url = parsed.url.ok_or(DeviceError::MalformedResponse)?;

        tracing::info!(%url, "Motion script hosted");
        Ok(url)
    }

    fn setup(&self, script_url: &str) -> Result<(), DeviceError> {
        // Mode switch first; the device rejects setup outside scripted mode
        let mode_url = format!("{}/mode", self.api_base);
        self.execute(self.authed(self.client.put(&mode_url).timeout(SETUP_TIMEOUT)))?;
        tracing::debug!("Device switched to scripted-playback mode");

        let setup_url = self.command_url("setup");
        self.execute(
            self.authed(self.client.put(&setup_url).timeout(SETUP_TIMEOUT))
                .json(&SetupRequest { url: script_url }),
        )?;

        tracing::info!("Device setup complete");
        Ok(())
    }

    fn play(&self, position_ms: i64, server_time_ms: i64) -> Result<(), DeviceError> {
        let url = self.command_url("play");
        let req = self.authed(self.client.put(&url).timeout(PLAY_TIMEOUT));

        let req = match self.generation {
            ApiGeneration::V3 => req.json(&PlayRequestV3 {
                estimated_server_time: server_time_ms,
                start_time: position_ms,
            }),
            ApiGeneration::V4 => req.json(&PlayRequestV4 {
                start_time: position_ms,
                server_time: server_time_ms,
                playback_rate: 1.0,
                looping: false,
            }),
        };

        self.execute(req)?;
        tracing::info!(position_ms, server_time_ms, "Device playback started");
        Ok(())
    }

    fn sync_time(&self, position_ms: i64, server_time_ms: i64) -> Result<(), DeviceError> {
        let url = self.command_url("synctime");
        self.execute(
            self.authed(self.client.put(&url).timeout(SYNC_TIMEOUT))
                .json(&SyncTimeRequest {
                    start_time: position_ms,
                    server_time: server_time_ms,
                }),
        )?;
        tracing::debug!(position_ms, server_time_ms, "Device playhead corrected");
        Ok(())
    }

    fn stop(&self) -> Result<(), DeviceError> {
        let url = format!("{}/stop", self.api_base);
        self.execute(self.authed(self.client.put(&url).timeout(STOP_TIMEOUT)))?;
        tracing::info!("Device playback stopped");
        Ok(())
    }
}
