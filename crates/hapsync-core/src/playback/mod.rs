//! Local playback engine collaborator
//!
//! The coordinator never decodes or renders video; it observes an external
//! player through the `Player` trait and mirrors its state onto the remote
//! device. `vlc` provides the production implementation over VLC's HTTP
//! interface.

pub mod vlc;

pub use vlc::VlcHttpPlayer;

/// Observed playback state of the local media stream
///
/// Owned by the coordinator; transitions happen only through observed
/// signals from the playback engine, never directly from input handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No playback observed yet
    Idle,
    /// Media is advancing
    Playing,
    /// Media is paused mid-stream
    Paused,
    /// Media finished, was stopped, or errored; terminal
    Ended,
}

/// External playback engine interface
///
/// Implementations are shared between the coordination loop (state and
/// position polling) and the input loop (pause toggling), so methods take
/// `&self` and implementations carry their own interior synchronization.
pub trait Player: Send + Sync {
    /// Current observed state; errors degrade to the last known state
    fn current_state(&self) -> PlaybackState;

    /// Current playhead position, when the engine can report one
    fn current_position_ms(&self) -> Option<i64>;

    /// Begin playback
    fn start(&self) -> anyhow::Result<()>;

    /// Toggle between playing and paused
    fn pause_toggle(&self) -> anyhow::Result<()>;

    /// Stop playback entirely
    fn stop(&self) -> anyhow::Result<()>;
}
