//! Hapsync - remote playback synchronizer
//!
//! This library re-exports the clock synchronization, playback coordination,
//! and pause budget functionality from `hapsync-core`.

pub use hapsync_core::{config, coordinator, device, input, pause, playback, session, sync};

pub use hapsync_core::{
    AppConfig, HttpDeviceClient, PauseBudgetController, PlaybackCoordinator, PlaybackState,
    SessionEnd, SessionShared, SyncScheduler, TimeSyncEstimator,
};
pub use hapsync_core::{
    DEFAULT_COORDINATOR_POLL_MS, DEFAULT_INPUT_POLL_MS, DEFAULT_SYNC_PROBES, VERSION,
};
