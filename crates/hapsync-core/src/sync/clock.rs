//! Clock-offset estimation from repeated round-trip probes
//!
//! A single probe of the remote time endpoint is vulnerable to one slow
//! outlier, so the estimator averages several independent round trips.
//! Each probe assumes symmetric latency only for its own half-RTT
//! correction; the per-sample offsets are then averaged over the probes
//! that succeeded.

use crate::device::client::DeviceError;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors produced by a synchronization pass
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("all {attempts} time sync probes failed")]
    AllProbesFailed { attempts: usize },
}

/// Source of the remote server's wall-clock time
///
/// Implemented by the HTTP device client and by test fakes. One call is one
/// network round trip.
pub trait TimeSource {
    fn server_time_ms(&self) -> Result<i64, DeviceError>;
}

/// One timestamped probe of the remote time endpoint
///
/// Created per probe and discarded after aggregation.
#[derive(Debug, Clone, Copy)]
pub struct ClockSample {
    /// Local wall-clock ms when the request was sent
    pub local_send_ms: i64,
    /// Server wall-clock ms as reported in the response
    pub remote_reported_ms: i64,
    /// Local wall-clock ms when the response arrived
    pub local_recv_ms: i64,
}

impl ClockSample {
    /// Round-trip delay of this probe in milliseconds
    pub fn round_trip_ms(&self) -> i64 {
        self.local_recv_ms - self.local_send_ms
    }

    /// Estimated clock offset of this probe in milliseconds
    ///
    /// Positive means the server clock is ahead of the local clock. The
    /// server's report is assumed to describe the midpoint of the round trip.
    pub fn offset_ms(&self) -> f64 {
        (self.remote_reported_ms as f64 + self.round_trip_ms() as f64 / 2.0)
            - self.local_recv_ms as f64
    }
}

/// Aggregated clock estimate from one full synchronization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncEstimate {
    /// Estimated server-minus-local clock offset in milliseconds
    pub offset_ms: i64,
    /// Mean round-trip delay across the successful probes in milliseconds
    pub round_trip_ms: u64,
}

/// Estimates the offset between the local clock and the device server's clock
///
/// The estimate is owned exclusively by this type and overwritten only by a
/// full successful re-sync pass. A pass in which every probe fails leaves the
/// previous estimate intact (zero offset if never synced) and fails loudly,
/// since downstream playback timing depends on a live estimate.
#[derive(Debug, Default)]
pub struct TimeSyncEstimator {
    estimate: SyncEstimate,
    synced: bool,
}

impl TimeSyncEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current estimate (last successful pass, or zeroes if never synced)
    pub fn estimate(&self) -> SyncEstimate {
        self.estimate
    }

    /// True once at least one synchronization pass has succeeded
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Run a full synchronization pass of `sample_count` probes
    ///
    /// Probes that fail are skipped, not fatal; the estimate is the
    /// arithmetic mean of offset and round trip over the successful probes.
    ///
    /// # Errors
    /// `SyncError::AllProbesFailed` when zero probes succeed. The stored
    /// estimate is not modified in that case.
    pub fn synchronize(
        &mut self,
        source: &dyn TimeSource,
        sample_count: usize,
    ) -> Result<SyncEstimate, SyncError> {
        let mut total_offset = 0.0f64;
        let mut total_round_trip = 0i64;
        let mut successes = 0usize;

        for attempt in 0..sample_count {
            match Self::probe(source) {
                Ok(sample) => {
                    total_offset += sample.offset_ms();
                    total_round_trip += sample.round_trip_ms();
                    successes += 1;
                    tracing::debug!(
                        attempt = attempt + 1,
                        offset_ms = sample.offset_ms(),
                        round_trip_ms = sample.round_trip_ms(),
                        "Clock probe"
                    );
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "Clock probe failed");
                }
            }
        }

        if successes == 0 {
            return Err(SyncError::AllProbesFailed {
                attempts: sample_count,
            });
        }

        self.estimate = SyncEstimate {
            offset_ms: (total_offset / successes as f64).round() as i64,
            round_trip_ms: (total_round_trip as f64 / successes as f64).round().max(0.0) as u64,
        };
        self.synced = true;

        tracing::info!(
            offset_ms = self.estimate.offset_ms,
            round_trip_ms = self.estimate.round_trip_ms,
            successes,
            attempts = sample_count,
            "Server clock synchronized"
        );

        Ok(self.estimate)
    }

    /// Estimated current server time in milliseconds
    ///
    /// Pure arithmetic over the stored offset; no I/O, callable at any
    /// frequency.
    pub fn estimated_server_time_ms(&self) -> i64 {
        wall_clock_ms() + self.estimate.offset_ms
    }

    fn probe(source: &dyn TimeSource) -> Result<ClockSample, DeviceError> {
        let local_send_ms = wall_clock_ms();
        let remote_reported_ms = source.server_time_ms()?;
        let local_recv_ms = wall_clock_ms();
        Ok(ClockSample {
            local_send_ms,
            remote_reported_ms,
            local_recv_ms,
        })
    }
}

/// Local wall-clock time in milliseconds since the Unix epoch
pub fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
