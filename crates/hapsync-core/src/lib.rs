//! Hapsync Core - Clock synchronization, playback coordination, and pause budget
//!
//! This library keeps a remote actuation device's motion script aligned with a
//! locally playing video over a best-effort network link. It estimates the
//! offset between the local clock and the device server's clock, drives a
//! playback state machine that mirrors the local player onto the device, and
//! enforces a persisted pause budget with a non-preemptible countdown.

pub mod config;
pub mod coordinator;
pub mod device;
pub mod input;
pub mod pause;
pub mod playback;
pub mod session;
pub mod sync;

pub use config::AppConfig;
pub use coordinator::{PlaybackCoordinator, SessionEnd};
pub use device::client::HttpDeviceClient;
pub use pause::PauseBudgetController;
pub use playback::PlaybackState;
pub use session::SessionShared;
pub use sync::clock::TimeSyncEstimator;
pub use sync::scheduler::SyncScheduler;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of clock probes per synchronization pass
pub const DEFAULT_SYNC_PROBES: usize = 10;

/// Default coordination loop polling interval in milliseconds
pub const DEFAULT_COORDINATOR_POLL_MS: u64 = 250;

/// Default input loop polling interval in milliseconds
pub const DEFAULT_INPUT_POLL_MS: u64 = 50;
