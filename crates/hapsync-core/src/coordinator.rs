//! Top-level playback coordination state machine
//!
//! Polls the local player on a fixed short interval and mirrors its state
//! onto the remote device: a start command when playback begins, a stop when
//! it pauses or ends, and periodic playhead corrections while it plays. The
//! external playback engine's notification granularity is coarse, so polling
//! is the deliberate model here; the interval is configuration, not a
//! correctness requirement.
//!
//! Per-tick order is fixed: observe playback state, check the abort trigger,
//! handle transitions, then check for a due correction. An abort observed
//! mid-tick therefore always preempts a correction scheduled for that tick.
//!
//! A pause is treated as a fresh session on resume: elapsed local time
//! during the pause is not in the device's addressable timeline, so resume
//! re-issues a full start rather than a correction.

use crate::device::client::{DeviceControl, DeviceError};
use crate::playback::{PlaybackState, Player};
use crate::session::{AbortMarker, SessionShared};
use crate::sync::clock::TimeSyncEstimator;
use crate::sync::scheduler::{SyncScheduleState, SyncScheduler};
use std::time::{Duration, Instant};

/// How a coordinated session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Playback ran to its natural end (or the user quit)
    Completed,
    /// The abort trigger fired
    Aborted,
}

/// Whether the loop continues after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Finished(SessionEnd),
}

/// Counters reported when the session ends
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionStats {
    /// Device start commands issued
    pub starts_issued: u64,
    /// Corrections issued successfully
    pub corrections_sent: u64,
    /// Corrections skipped due to a failed call
    pub corrections_skipped: u64,
    /// Device stop commands issued
    pub stops_issued: u64,
}

/// Coordinates the local player and the remote device for one session
pub struct PlaybackCoordinator<'a, D: DeviceControl> {
    device: &'a D,
    player: &'a dyn Player,
    shared: &'a SessionShared,
    estimator: &'a TimeSyncEstimator,
    marker: AbortMarker,
    scheduler: SyncScheduler,
    schedule: SyncScheduleState,
    state: PlaybackState,
    stats: SessionStats,
    poll_interval: Duration,
    /// True between a successful start and the next stop; suppresses
    /// redundant stop commands so the device sees exactly one per session
    device_running: bool,
}

impl<'a, D: DeviceControl> PlaybackCoordinator<'a, D> {
    pub fn new(
        device: &'a D,
        player: &'a dyn Player,
        shared: &'a SessionShared,
        estimator: &'a TimeSyncEstimator,
        marker: AbortMarker,
        poll_interval: Duration,
    ) -> Self {
        Self {
            device,
            player,
            shared,
            estimator,
            marker,
            scheduler: SyncScheduler::default(),
            schedule: SyncScheduleState::new(),
            state: PlaybackState::Idle,
            stats: SessionStats::default(),
            poll_interval,
            device_running: false,
        }
    }

    /// Current coordinator-owned playback state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Session counters, for reporting
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Run the coordination loop to session end
    ///
    /// # Errors
    /// A failed device start command is fatal: the session cannot proceed
    /// without a synchronized remote routine. Correction failures are logged
    /// and skipped; stop is best-effort.
    pub fn run(&mut self) -> Result<SessionEnd, DeviceError> {
        tracing::info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            "Coordination loop started"
        );

        let end = loop {
            match self.tick(Instant::now()) {
                Ok(TickFlow::Continue) => {}
                Ok(TickFlow::Finished(end)) => break end,
                Err(e) => {
                    tracing::error!(error = %e, "Device start failed, ending session");
                    self.stop_device_best_effort();
                    self.transition(PlaybackState::Ended);
                    return Err(e);
                }
            }
            std::thread::sleep(self.poll_interval);
        };

        tracing::info!(
            starts = self.stats.starts_issued,
            corrections_sent = self.stats.corrections_sent,
            corrections_skipped = self.stats.corrections_skipped,
            stops = self.stats.stops_issued,
            "Coordination loop ended"
        );
        Ok(end)
    }

    /// One poll cycle: observe, check abort, transition, correct
    pub fn tick(&mut self, now: Instant) -> Result<TickFlow, DeviceError> {
        let observed = self.player.current_state();

        // Abort preempts everything else observed this tick
        if self.shared.is_aborted() || self.marker.is_set() {
            if !self.shared.is_aborted() {
                self.shared.trigger_abort("abort marker present");
            }
            self.stop_device_best_effort();
            self.schedule.clear();
            self.transition(PlaybackState::Ended);
            return Ok(TickFlow::Finished(SessionEnd::Aborted));
        }

        match (self.state, observed) {
            (PlaybackState::Idle, PlaybackState::Playing)
            | (PlaybackState::Paused, PlaybackState::Playing) => {
                // A resume is a fresh session: same action as the first start
                let Some(position) = self.player.current_position_ms() else {
                    tracing::debug!("Playback position unavailable, retrying next tick");
                    return Ok(TickFlow::Continue);
                };
                self.issue_start(position, now)?;
                self.transition(PlaybackState::Playing);
            }
            (PlaybackState::Playing, PlaybackState::Paused) => {
                self.stop_device_best_effort();
                self.schedule.clear();
                self.transition(PlaybackState::Paused);
            }
            (PlaybackState::Playing, PlaybackState::Ended)
            | (PlaybackState::Paused, PlaybackState::Ended)
            | (PlaybackState::Idle, PlaybackState::Ended) => {
                tracing::info!("Playback ended");
                self.stop_device_best_effort();
                self.schedule.clear();
                self.transition(PlaybackState::Ended);
                return Ok(TickFlow::Finished(SessionEnd::Completed));
            }
            _ => {}
        }

        if self.state == PlaybackState::Playing {
            self.maybe_correct(now);
        }

        Ok(TickFlow::Continue)
    }

    /// Issue a periodic correction when the scheduler says one is due
    ///
    /// A failed call is skipped, never fatal: the device keeps running its
    /// last-known schedule and the next due tick retries.
    fn maybe_correct(&mut self, now: Instant) {
        let (Some(start), Some(last)) = (
            self.schedule.session_start(),
            self.schedule.last_correction(),
        ) else {
            return;
        };

        if !self.scheduler.should_correct(now, start, last) {
            return;
        }

        let Some(position) = self.player.current_position_ms() else {
            return;
        };

        let server_time = self.estimator.estimated_server_time_ms();
        match self.device.sync_time(position, server_time) {
            Ok(()) => {
                self.schedule.mark_corrected(now);
                self.stats.corrections_sent += 1;
            }
            Err(e) => {
                self.stats.corrections_skipped += 1;
                tracing::warn!(error = %e, "Correction failed, skipping until next due tick");
            }
        }
    }

    /// Issue the device start command for a session beginning at `position`
    ///
    /// The position is led by half the measured round trip so the script is
    /// where the video will be once the command lands.
    fn issue_start(&mut self, position: i64, now: Instant) -> Result<(), DeviceError> {
        let lead = (self.estimator.estimate().round_trip_ms / 2) as i64;
        let server_time = self.estimator.estimated_server_time_ms();

        self.device.play(position + lead, server_time)?;
        self.device_running = true;
        self.stats.starts_issued += 1;
        self.schedule.begin(now);
        Ok(())
    }

    /// Stop the device if it may be running; failures are logged only
    ///
    /// Stop is idempotent from our perspective, so a failure here usually
    /// means the device was already stopped.
    fn stop_device_best_effort(&mut self) {
        if !self.device_running {
            return;
        }
        match self.device.stop() {
            Ok(()) => {
                self.stats.stops_issued += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Device stop failed (may already be stopped)");
            }
        }
        self.device_running = false;
    }

    fn transition(&mut self, to: PlaybackState) {
        if self.state != to {
            tracing::info!(from = ?self.state, to = ?to, "Playback transition");
        }
        self.state = to;
        self.shared.set_playback_state(to);
    }
}
