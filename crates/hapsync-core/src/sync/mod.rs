//! Clock synchronization against the remote device server
//!
//! `clock` estimates the local-to-server clock offset from repeated
//! round-trip probes; `scheduler` decides when a playing session is due for
//! a fine-tune correction.

pub mod clock;
pub mod scheduler;

pub use clock::{ClockSample, SyncEstimate, TimeSource, TimeSyncEstimator};
pub use scheduler::{SyncScheduleState, SyncScheduler};
