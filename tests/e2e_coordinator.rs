//! E2E tests for the playback coordinator
//!
//! Drives the full state machine against a scripted player and a recording
//! device: session lifecycle, the fresh-start-on-resume rule, correction
//! cadence, and abort priority. Ticks are fed fabricated instants so the
//! cadence is deterministic.

use hapsync::coordinator::{PlaybackCoordinator, SessionEnd, TickFlow};
use hapsync::device::client::{DeviceControl, DeviceError};
use hapsync::playback::{PlaybackState, Player};
use hapsync::session::{AbortMarker, SessionShared};
use hapsync::sync::clock::TimeSyncEstimator;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct FakePlayer {
    state: Mutex<PlaybackState>,
    position_ms: Mutex<Option<i64>>,
}

impl FakePlayer {
    fn new(state: PlaybackState, position_ms: Option<i64>) -> Self {
        Self {
            state: Mutex::new(state),
            position_ms: Mutex::new(position_ms),
        }
    }

    fn set(&self, state: PlaybackState, position_ms: Option<i64>) {
        *self.state.lock().unwrap() = state;
        *self.position_ms.lock().unwrap() = position_ms;
    }
}

impl Player for FakePlayer {
    fn current_state(&self) -> PlaybackState {
        *self.state.lock().unwrap()
    }
    fn current_position_ms(&self) -> Option<i64> {
        *self.position_ms.lock().unwrap()
    }
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }
    fn pause_toggle(&self) -> anyhow::Result<()> {
        Ok(())
    }
    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingDevice {
    commands: Mutex<Vec<String>>,
    fail_play: Mutex<bool>,
}

impl RecordingDevice {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn stop_count(&self) -> usize {
        self.commands().iter().filter(|c| *c == "stop").count()
    }
}

impl DeviceControl for RecordingDevice {
    fn upload_script(&self, _path: &Path) -> Result<String, DeviceError> {
        Ok("https://host.example/script".into())
    }
    fn setup(&self, _script_url: &str) -> Result<(), DeviceError> {
        Ok(())
    }
    fn play(&self, position_ms: i64, _server_time_ms: i64) -> Result<(), DeviceError> {
        if *self.fail_play.lock().unwrap() {
            return Err(DeviceError::Api {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.commands.lock().unwrap().push(format!("play:{}", position_ms));
        Ok(())
    }
    fn sync_time(&self, position_ms: i64, _server_time_ms: i64) -> Result<(), DeviceError> {
        self.commands.lock().unwrap().push(format!("sync:{}", position_ms));
        Ok(())
    }
    fn stop(&self) -> Result<(), DeviceError> {
        self.commands.lock().unwrap().push("stop".into());
        Ok(())
    }
}

struct Harness {
    player: FakePlayer,
    device: RecordingDevice,
    shared: SessionShared,
    estimator: TimeSyncEstimator,
    _dir: tempfile::TempDir,
    marker: AbortMarker,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let marker = AbortMarker::new(dir.path().join("abort.trigger"));
        Self {
            player: FakePlayer::new(PlaybackState::Idle, None),
            device: RecordingDevice::default(),
            shared: SessionShared::new(),
            estimator: TimeSyncEstimator::new(),
            _dir: dir,
            marker,
        }
    }

    fn coordinator(&self) -> PlaybackCoordinator<'_, RecordingDevice> {
        PlaybackCoordinator::new(
            &self.device,
            &self.player,
            &self.shared,
            &self.estimator,
            self.marker.clone(),
            Duration::from_millis(10),
        )
    }
}

#[test]
fn test_full_session_lifecycle() {
    let h = Harness::new();
    let mut coordinator = h.coordinator();
    let t0 = Instant::now();

    // Idle until the player reports playing
    assert_eq!(coordinator.tick(t0).unwrap(), TickFlow::Continue);
    assert_eq!(coordinator.state(), PlaybackState::Idle);

    // First playing observation: start command with the current position
    h.player.set(PlaybackState::Playing, Some(500));
    coordinator.tick(t0 + Duration::from_millis(250)).unwrap();
    assert_eq!(h.device.commands(), vec!["play:500"]);

    // Natural end: stop command, session completed
    h.player.set(PlaybackState::Ended, None);
    let flow = coordinator.tick(t0 + Duration::from_secs(90)).unwrap();
    assert_eq!(flow, TickFlow::Finished(SessionEnd::Completed));
    assert_eq!(h.device.commands(), vec!["play:500", "stop"]);
    assert_eq!(h.shared.playback_state(), PlaybackState::Ended);
}

#[test]
fn test_resume_is_fresh_start_not_correction() {
    let h = Harness::new();
    let mut coordinator = h.coordinator();
    let t0 = Instant::now();

    h.player.set(PlaybackState::Playing, Some(0));
    coordinator.tick(t0).unwrap();

    // Pause at 8s, then resume at 60s with the scheduler long past due:
    // the coordinator must issue a start, never a correction
    h.player.set(PlaybackState::Paused, Some(8_000));
    coordinator.tick(t0 + Duration::from_secs(8)).unwrap();

    h.player.set(PlaybackState::Playing, Some(8_000));
    coordinator.tick(t0 + Duration::from_secs(60)).unwrap();

    let commands = h.device.commands();
    assert_eq!(commands, vec!["play:0", "stop", "play:8000"]);
    assert!(
        !commands.iter().any(|c| c.starts_with("sync:")),
        "resume must never be a correction"
    );
}

#[test]
fn test_correction_cadence_over_session() {
    let h = Harness::new();
    let mut coordinator = h.coordinator();
    let t0 = Instant::now();

    h.player.set(PlaybackState::Playing, Some(0));
    coordinator.tick(t0).unwrap();

    // Tick at 250ms granularity for 25 simulated seconds
    let mut t = Duration::ZERO;
    while t <= Duration::from_secs(25) {
        let position = t.as_millis() as i64;
        h.player.set(PlaybackState::Playing, Some(position));
        coordinator.tick(t0 + t).unwrap();
        t += Duration::from_millis(250);
    }

    let syncs: Vec<String> = h
        .device
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("sync:"))
        .collect();
    // Front-loaded: 2, 4, 6, 8, 10s; steady: 20s
    assert_eq!(
        syncs,
        vec!["sync:2000", "sync:4000", "sync:6000", "sync:8000", "sync:10000", "sync:20000"]
    );
}

#[test]
fn test_abort_stops_device_exactly_once() {
    let h = Harness::new();
    let mut coordinator = h.coordinator();
    let t0 = Instant::now();

    h.player.set(PlaybackState::Playing, Some(0));
    coordinator.tick(t0).unwrap();

    // The user pauses (device stopped), then the trigger fires during the
    // countdown: the abort path must not send a second stop
    h.player.set(PlaybackState::Paused, Some(3_000));
    coordinator.tick(t0 + Duration::from_secs(3)).unwrap();
    assert_eq!(h.device.stop_count(), 1);

    h.shared.trigger_abort("trigger during countdown");
    let flow = coordinator.tick(t0 + Duration::from_secs(4)).unwrap();
    assert_eq!(flow, TickFlow::Finished(SessionEnd::Aborted));
    assert_eq!(h.device.stop_count(), 1, "exactly one stop per session");
}

#[test]
fn test_abort_while_playing_stops_device() {
    let h = Harness::new();
    let mut coordinator = h.coordinator();
    let t0 = Instant::now();

    h.player.set(PlaybackState::Playing, Some(0));
    coordinator.tick(t0).unwrap();

    h.shared.trigger_abort("mid-playback");
    let flow = coordinator.tick(t0 + Duration::from_secs(1)).unwrap();
    assert_eq!(flow, TickFlow::Finished(SessionEnd::Aborted));
    assert_eq!(h.device.stop_count(), 1);
}

#[test]
fn test_fatal_start_failure_surfaces() {
    let h = Harness::new();
    *h.device.fail_play.lock().unwrap() = true;

    let mut coordinator = h.coordinator();
    h.player.set(PlaybackState::Playing, Some(0));

    let result = coordinator.tick(Instant::now());
    assert!(result.is_err(), "a failed start command is fatal");
}

#[test]
fn test_run_loop_completes_with_real_time() {
    // Smoke test of run() with the real polling loop: play briefly, end
    let h = Harness::new();
    let mut coordinator = h.coordinator();

    h.player.set(PlaybackState::Playing, Some(0));
    let scripted = std::thread::scope(|scope| {
        let player = &h.player;
        scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            player.set(PlaybackState::Ended, None);
        });
        coordinator.run()
    });

    assert_eq!(scripted.unwrap(), SessionEnd::Completed);
    assert_eq!(h.device.commands().first().map(String::as_str), Some("play:0"));
    assert_eq!(h.device.stop_count(), 1);
}

#[test]
fn test_run_loop_observes_abort_within_interval() {
    let h = Harness::new();
    let mut coordinator = h.coordinator();

    h.player.set(PlaybackState::Playing, Some(0));
    let started = Instant::now();
    let outcome = std::thread::scope(|scope| {
        let shared = &h.shared;
        scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            shared.trigger_abort("test");
        });
        coordinator.run()
    });

    assert_eq!(outcome.unwrap(), SessionEnd::Aborted);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "abort must be observed within a polling interval"
    );
}
