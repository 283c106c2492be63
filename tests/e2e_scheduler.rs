//! E2E tests for the correction scheduling policy
//!
//! The scheduler is pure, so these tests drive it with fabricated instants:
//! corrections every 2s inside the first 10s of a session, every 10s after.

use hapsync::sync::scheduler::{SyncScheduleState, SyncScheduler};
use std::time::{Duration, Instant};

fn at(base: Instant, secs: f64) -> Instant {
    base + Duration::from_secs_f64(secs)
}

#[test]
fn test_truth_table() {
    let s = SyncScheduler::default();
    let t0 = Instant::now();

    // (now_secs, last_correction_secs, expected)
    let cases = [
        (0.5, 0.0, false),  // nothing elapsed yet
        (2.0, 0.0, true),   // initial phase, 2s since last
        (3.9, 2.0, false),  // initial phase, 1.9s since last
        (4.0, 2.0, true),   // initial phase, exactly 2s since last
        (10.0, 8.0, true),  // still initial phase at the 10s boundary
        (10.5, 9.0, false), // steady phase, 1.5s since last
        (19.9, 10.0, false), // steady phase, 9.9s since last
        (20.0, 10.0, true), // steady phase, exactly 10s since last
        (60.0, 45.0, true), // steady phase, well past due
    ];

    for (now_s, last_s, expected) in cases {
        let got = s.should_correct(at(t0, now_s), t0, at(t0, last_s));
        assert_eq!(
            got, expected,
            "now={}s last={}s: expected {}, got {}",
            now_s, last_s, expected, got
        );
    }
}

#[test]
fn test_spec_boundary_example() {
    let s = SyncScheduler::default();
    let t0 = Instant::now();
    let last = at(t0, 2.0);

    // 11s into the session with 9s since the last correction: the steady
    // interval applies and has not elapsed
    assert!(!s.should_correct(at(t0, 11.0), t0, last));
    // At 12s the elapsed-since-last reaches 10s
    assert!(s.should_correct(at(t0, 12.0), t0, last));
}

#[test]
fn test_front_loaded_cadence_sequence() {
    // Walk a session: corrections land at 2, 4, 6, 8, 10, then 20, 30
    let s = SyncScheduler::default();
    let t0 = Instant::now();
    let mut state = SyncScheduleState::new();
    state.begin(t0);

    let mut corrected_at = Vec::new();
    let mut t = 0.0;
    while t <= 35.0 {
        let now = at(t0, t);
        let (start, last) = (
            state.session_start().unwrap(),
            state.last_correction().unwrap(),
        );
        if s.should_correct(now, start, last) {
            state.mark_corrected(now);
            corrected_at.push(t);
        }
        t += 0.25;
    }

    assert_eq!(
        corrected_at,
        vec![2.0, 4.0, 6.0, 8.0, 10.0, 20.0, 30.0],
        "correction cadence should front-load then decay"
    );
}

#[test]
fn test_cleared_state_has_no_session() {
    let mut state = SyncScheduleState::new();
    state.begin(Instant::now());
    assert!(state.is_active());

    state.clear();
    assert!(!state.is_active());
    assert!(state.session_start().is_none());
    assert!(state.last_correction().is_none());
}
