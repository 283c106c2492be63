//! VLC player driven through its HTTP interface
//!
//! VLC is spawned with the dummy interface plus `--extraintf http`, then
//! polled over `GET /requests/status.json`. Commands go through the same
//! endpoint (`pl_pause`, `pl_stop`, `pl_play`). The playhead position is
//! reconstructed from `position * length`, which carries sub-second
//! precision where the integer `time` field does not.

use super::{PlaybackState, Player};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Timeout for a single status/command request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive failed status polls before the player is considered gone
const MAX_STATUS_FAILURES: u32 = 8;

/// How long to wait for the HTTP interface and for playback to begin
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for startup
const STARTUP_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Deserialize)]
struct VlcStatus {
    state: String,
    #[serde(default)]
    length: f64,
    #[serde(default)]
    position: f64,
    #[serde(default)]
    time: f64,
}

/// Cached view of the player, updated on every successful status poll
#[derive(Debug)]
struct StatusCache {
    state: PlaybackState,
    position_ms: Option<i64>,
    consecutive_failures: u32,
}

/// VLC media player handle over the HTTP interface
pub struct VlcHttpPlayer {
    client: reqwest::blocking::Client,
    base_url: String,
    password: String,
    child: Mutex<Option<Child>>,
    cache: Mutex<StatusCache>,
}

impl VlcHttpPlayer {
    /// Spawn a VLC process playing `media` and return a handle to it
    ///
    /// The process starts with the dummy control interface, the HTTP remote
    /// interface bound to localhost, and fullscreen output.
    pub fn spawn(
        vlc_binary: &str,
        media: &Path,
        http_port: u16,
        http_password: &str,
    ) -> Result<Self> {
        let child = Command::new(vlc_binary)
            .arg("--intf")
            .arg("dummy")
            .arg("--extraintf")
            .arg("http")
            .arg("--http-host")
            .arg("127.0.0.1")
            .arg("--http-port")
            .arg(http_port.to_string())
            .arg("--http-password")
            .arg(http_password)
            .arg("--fullscreen")
            .arg("--no-video-title-show")
            .arg("--play-and-exit")
            .arg(media)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch player binary '{}'", vlc_binary))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("http://127.0.0.1:{}/requests/status.json", http_port),
            password: http_password.to_string(),
            child: Mutex::new(Some(child)),
            cache: Mutex::new(StatusCache {
                state: PlaybackState::Idle,
                position_ms: None,
                consecutive_failures: 0,
            }),
        })
    }

    /// Block until the HTTP interface answers and playback has begun
    pub fn wait_until_playing(&self) -> Result<()> {
        let deadline = Instant::now() + STARTUP_TIMEOUT;

        // The HTTP interface comes up noticeably after the process does
        while self.fetch_status().is_err() {
            if Instant::now() >= deadline {
                return Err(anyhow!("player HTTP interface did not come up"));
            }
            std::thread::sleep(STARTUP_POLL);
        }

        loop {
            match self.fetch_status() {
                Ok(status) if status.state == "playing" => {
                    tracing::info!("Video playback started");
                    return Ok(());
                }
                Ok(status) => {
                    tracing::debug!(state = %status.state, "Waiting for playback");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Status poll failed during startup");
                }
            }
            if Instant::now() >= deadline {
                return Err(anyhow!("video failed to start playing"));
            }
            std::thread::sleep(STARTUP_POLL);
        }
    }

    fn fetch_status(&self) -> Result<VlcStatus> {
        let resp = self
            .client
            .get(&self.base_url)
            .basic_auth("", Some(&self.password))
            .send()?
            .error_for_status()?;
        Ok(resp.json::<VlcStatus>()?)
    }

    fn send_command(&self, command: &str) -> Result<()> {
        self.client
            .get(&self.base_url)
            .basic_auth("", Some(&self.password))
            .query(&[("command", command)])
            .send()?
            .error_for_status()?;
        Ok(())
    }

    /// Poll VLC and fold the result into the cached view
    fn refresh(&self) {
        let mut cache = match self.cache.lock() {
            Ok(c) => c,
            Err(_) => return,
        };

        match self.fetch_status() {
            Ok(status) => {
                cache.consecutive_failures = 0;
                cache.state = match status.state.as_str() {
                    "playing" => PlaybackState::Playing,
                    "paused" => PlaybackState::Paused,
                    "stopped" => PlaybackState::Ended,
                    _ => cache.state,
                };
                cache.position_ms = if status.length > 0.0 {
                    Some((status.position * status.length * 1000.0).round() as i64)
                } else if status.time > 0.0 {
                    Some((status.time * 1000.0).round() as i64)
                } else {
                    None
                };
            }
            Err(e) => {
                cache.consecutive_failures += 1;
                cache.position_ms = None;
                if cache.consecutive_failures >= MAX_STATUS_FAILURES {
                    // Interface gone for ~2s of polls: the process has exited
                    tracing::info!("Player interface unreachable, treating as ended");
                    cache.state = PlaybackState::Ended;
                } else {
                    tracing::debug!(error = %e, failures = cache.consecutive_failures,
                        "Status poll failed, keeping last known state");
                }
            }
        }
    }
}

impl Player for VlcHttpPlayer {
    fn current_state(&self) -> PlaybackState {
        self.refresh();
        self.cache
            .lock()
            .map(|c| c.state)
            .unwrap_or(PlaybackState::Ended)
    }

    fn current_position_ms(&self) -> Option<i64> {
        self.refresh();
        self.cache.lock().ok().and_then(|c| c.position_ms)
    }

    fn start(&self) -> Result<()> {
        self.send_command("pl_play")
    }

    fn pause_toggle(&self) -> Result<()> {
        self.send_command("pl_pause")
    }

    fn stop(&self) -> Result<()> {
        self.send_command("pl_stop")
    }
}

impl Drop for VlcHttpPlayer {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_full_response() {
        let json = r#"{"state":"playing","length":120,"position":0.25,"time":30,"volume":256}"#;
        let status: VlcStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.state, "playing");
        assert_eq!(status.length, 120.0);
        assert_eq!(status.position, 0.25);
    }

    #[test]
    fn test_status_parses_minimal_response() {
        // Stopped players omit the timing fields
        let json = r#"{"state":"stopped"}"#;
        let status: VlcStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.state, "stopped");
        assert_eq!(status.length, 0.0);
        assert_eq!(status.position, 0.0);
    }

    #[test]
    fn test_position_from_fraction_beats_integer_time() {
        // position * length keeps sub-second precision the `time` field drops
        let length = 120.0f64;
        let position = 0.254166;
        let ms = (position * length * 1000.0).round() as i64;
        assert_eq!(ms, 30500);
    }
}
