//! Correction scheduling policy for a playing session
//!
//! Drift and estimation error are largest immediately after an imprecise
//! start command and shrink as the session stabilizes, so corrections
//! front-load: every 2 seconds for the first 10 seconds of a session, every
//! 10 seconds after that.
//!
//! The scheduler is pure policy. The caller issues the actual correction
//! message and records `last_correction` only when issuance succeeded.

use std::time::{Duration, Instant};

/// Length of the front-loaded phase after a session start
const INITIAL_WINDOW_SECS: u64 = 10;

/// Correction interval during the front-loaded phase
const INITIAL_INTERVAL_SECS: u64 = 2;

/// Correction interval once the session has stabilized
const STEADY_INTERVAL_SECS: u64 = 10;

/// Decaying-frequency correction policy
#[derive(Debug, Clone, Copy)]
pub struct SyncScheduler {
    /// How long the front-loaded phase lasts after session start
    pub initial_window: Duration,
    /// Correction interval inside the front-loaded phase
    pub initial_interval: Duration,
    /// Correction interval after the front-loaded phase
    pub steady_interval: Duration,
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self {
            initial_window: Duration::from_secs(INITIAL_WINDOW_SECS),
            initial_interval: Duration::from_secs(INITIAL_INTERVAL_SECS),
            steady_interval: Duration::from_secs(STEADY_INTERVAL_SECS),
        }
    }
}

impl SyncScheduler {
    /// Whether a fine-tune correction is due at `now`
    ///
    /// True iff the elapsed time since `last_correction` has reached the
    /// interval for the current phase: `initial_interval` while within
    /// `initial_window` of `session_start`, `steady_interval` afterwards.
    pub fn should_correct(
        &self,
        now: Instant,
        session_start: Instant,
        last_correction: Instant,
    ) -> bool {
        let since_start = now.saturating_duration_since(session_start);
        let since_last = now.saturating_duration_since(last_correction);

        if since_start <= self.initial_window {
            since_last >= self.initial_interval
        } else {
            since_last >= self.steady_interval
        }
    }
}

/// Correction timing for the current session
///
/// Set when playback enters Playing from Idle or Paused; cleared on
/// Playing -> Paused and at session end. The issued start command counts as
/// the first alignment, so `last_correction` begins at the session start.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncScheduleState {
    session_start: Option<Instant>,
    last_correction: Option<Instant>,
}

impl SyncScheduleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin timing a fresh session at `now`
    pub fn begin(&mut self, now: Instant) {
        self.session_start = Some(now);
        self.last_correction = Some(now);
    }

    /// Reset to unset (no active session)
    pub fn clear(&mut self) {
        self.session_start = None;
        self.last_correction = None;
    }

    /// Record a successfully issued correction at `now`
    pub fn mark_corrected(&mut self, now: Instant) {
        self.last_correction = Some(now);
    }

    /// True while a session is being timed
    pub fn is_active(&self) -> bool {
        self.session_start.is_some()
    }

    pub fn session_start(&self) -> Option<Instant> {
        self.session_start
    }

    pub fn last_correction(&self) -> Option<Instant> {
        self.last_correction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    #[test]
    fn test_initial_phase_two_second_cadence() {
        let s = SyncScheduler::default();
        let t0 = Instant::now();

        assert!(!s.should_correct(at(t0, 1.0), t0, t0));
        assert!(s.should_correct(at(t0, 2.0), t0, t0));
        assert!(s.should_correct(at(t0, 5.0), t0, at(t0, 2.0)));
        assert!(!s.should_correct(at(t0, 3.5), t0, at(t0, 2.0)));
    }

    #[test]
    fn test_steady_phase_ten_second_cadence() {
        let s = SyncScheduler::default();
        let t0 = Instant::now();

        // 11s into the session, last correction at 2s: 9s elapsed < 10s
        assert!(!s.should_correct(at(t0, 11.0), t0, at(t0, 2.0)));
        // One second later the steady interval is reached
        assert!(s.should_correct(at(t0, 12.0), t0, at(t0, 2.0)));
    }

    #[test]
    fn test_phase_boundary_at_ten_seconds() {
        let s = SyncScheduler::default();
        let t0 = Instant::now();

        // Exactly 10s since start is still the front-loaded phase
        assert!(s.should_correct(at(t0, 10.0), t0, at(t0, 8.0)));
        // Just past the window the steady interval applies
        assert!(!s.should_correct(at(t0, 10.5), t0, at(t0, 8.0)));
    }

    #[test]
    fn test_schedule_state_lifecycle() {
        let mut state = SyncScheduleState::new();
        assert!(!state.is_active());

        let t0 = Instant::now();
        state.begin(t0);
        assert!(state.is_active());
        assert_eq!(state.session_start(), Some(t0));
        assert_eq!(state.last_correction(), Some(t0));

        let t1 = t0 + Duration::from_secs(2);
        state.mark_corrected(t1);
        assert_eq!(state.session_start(), Some(t0));
        assert_eq!(state.last_correction(), Some(t1));

        state.clear();
        assert!(!state.is_active());
        assert_eq!(state.last_correction(), None);
    }
}
