//! Shared state between the coordination loop and the input loop
//!
//! The two loops never call into each other; everything they exchange lives
//! here: the observed playback state, the terminal abort flag, and the
//! on-disk abort marker that lets external processes share the trigger
//! channel.

use crate::playback::PlaybackState;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Default abort marker filename, created in the working directory
pub const ABORT_MARKER_FILE: &str = "session_abort.trigger";

/// Cross-loop shared session state
///
/// The abort flag is terminal: once set there is no un-abort path, and both
/// loops are expected to observe it within one polling interval.
#[derive(Debug)]
pub struct SessionShared {
    abort: AtomicBool,
    abort_reason: Mutex<Option<String>>,
    playback: Mutex<PlaybackState>,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            abort: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
            playback: Mutex::new(PlaybackState::Idle),
        }
    }

    /// Set the terminal abort flag; the first recorded reason wins
    pub fn trigger_abort(&self, reason: &str) {
        if !self.abort.swap(true, Ordering::SeqCst) {
            tracing::warn!(reason, "Session abort triggered");
            if let Ok(mut guard) = self.abort_reason.lock() {
                *guard = Some(reason.to_string());
            }
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn abort_reason(&self) -> Option<String> {
        self.abort_reason.lock().ok().and_then(|g| g.clone())
    }

    /// Publish the coordinator's view of playback for the input loop
    pub fn set_playback_state(&self, state: PlaybackState) {
        if let Ok(mut guard) = self.playback.lock() {
            *guard = state;
        }
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback
            .lock()
            .map(|g| *g)
            .unwrap_or(PlaybackState::Ended)
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk abort marker shared with external processes
///
/// Presence of the file is the trigger condition; its content is
/// informational only.
#[derive(Debug, Clone)]
pub struct AbortMarker {
    path: PathBuf,
}

impl AbortMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the marker file exists
    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    /// Create the marker, recording when and why
    pub fn set(&self, reason: &str) {
        let body = format!(
            "triggered_at={}\nreason={}\n",
            chrono::Utc::now().to_rfc3339(),
            reason
        );
        if let Err(e) = std::fs::write(&self.path, body) {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to write abort marker");
        }
    }

    /// Remove a stale marker left over from a previous run
    pub fn clear(&self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove abort marker");
            } else {
                tracing::info!("Cleared stale abort marker");
            }
        }
    }
}
