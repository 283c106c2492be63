//! Input-event abstraction and the input polling loop
//!
//! Raw key polling is isolated behind `InputSource`, which surfaces logical
//! actions instead of keys so the collaborator is swappable and testable.
//! The loop itself stays a deliberate fixed-interval poll; it blocks only on
//! its own sleep and communicates with the coordination loop exclusively
//! through `SessionShared` and the budget mutex.

use crate::pause::{CountdownOutcome, PauseBudgetController};
use crate::playback::{PlaybackState, Player};
use crate::session::{AbortMarker, SessionShared};
use crossbeam_channel::{Receiver, TryRecvError};
use std::io::BufRead;
use std::sync::Mutex;
use std::time::Duration;

/// How long a resync holds playback paused before resuming
const RESYNC_HOLD: Duration = Duration::from_millis(500);

/// Logical input actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Request a budgeted pause
    Pause,
    /// Force a short pause/resume cycle to re-anchor the device
    Resync,
    /// Fire the out-of-band abort trigger
    Trigger,
    /// End the session normally
    Quit,
}

/// Non-blocking, edge-triggered source of input actions
pub trait InputSource: Send {
    fn poll(&mut self) -> Option<Action>;
}

/// Input source reading lines from stdin on a background thread
///
/// Line-buffered terminals deliver a key only on Enter, so each line's first
/// token selects the action.
pub struct StdinInput {
    rx: Receiver<Action>,
}

impl StdinInput {
    pub fn spawn() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(_) => break,
                };
                if let Some(action) = parse_action(&line) {
                    if tx.send(action).is_err() {
                        break;
                    }
                }
            }
        });

        Self { rx }
    }
}

impl InputSource for StdinInput {
    fn poll(&mut self) -> Option<Action> {
        match self.rx.try_recv() {
            Ok(action) => Some(action),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Map one input line to a logical action
fn parse_action(line: &str) -> Option<Action> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => None,
        "p" | "pause" => Some(Action::Pause),
        "r" | "resync" => Some(Action::Resync),
        "t" | "trigger" => Some(Action::Trigger),
        "q" | "quit" | "esc" => Some(Action::Quit),
        other => {
            tracing::debug!(input = other, "Unrecognized input ignored");
            None
        }
    }
}

/// Run the input polling loop until the session ends
///
/// Exits when the abort flag is set, playback reaches Ended, or a
/// Trigger/Quit action fires. Pause countdowns run inside the budget lock,
/// which is the single serialization point the coordination loop shares.
pub fn run_input_loop(
    mut input: impl InputSource,
    player: &dyn Player,
    shared: &SessionShared,
    budget: &Mutex<PauseBudgetController>,
    marker: &AbortMarker,
    poll_interval: Duration,
) {
    tracing::info!("Input loop started (p=pause, r=resync, t=trigger, q=quit)");

    loop {
        let state = shared.playback_state();
        if shared.is_aborted() || state == PlaybackState::Ended {
            break;
        }

        match input.poll() {
            Some(Action::Pause) => {
                let granted = {
                    let mut ctrl = match budget.lock() {
                        Ok(c) => c,
                        Err(_) => break,
                    };
                    if !ctrl.try_pause(state) {
                        false
                    } else {
                        if let Err(e) = player.pause_toggle() {
                            tracing::warn!(error = %e, "Failed to pause playback");
                        }
                        match ctrl.run_countdown(shared) {
                            CountdownOutcome::Completed => true,
                            CountdownOutcome::Aborted => {
                                // Session is ending; never resume
                                return;
                            }
                        }
                    }
                };

                if granted {
                    if let Err(e) = player.pause_toggle() {
                        tracing::warn!(error = %e, "Failed to resume playback");
                    }
                    if let Ok(ctrl) = budget.lock() {
                        let b = ctrl.budget();
                        if b.pauses_remaining > 0 {
                            tracing::info!(remaining = b.pauses_remaining, "Pauses left");
                        } else {
                            tracing::info!("No pauses remaining");
                        }
                    }
                }
            }
            Some(Action::Resync) => {
                if state == PlaybackState::Playing {
                    tracing::info!("Resync requested: brief pause/resume cycle");
                    if player.pause_toggle().is_ok() {
                        std::thread::sleep(RESYNC_HOLD);
                        if let Err(e) = player.pause_toggle() {
                            tracing::warn!(error = %e, "Failed to resume after resync");
                        }
                    }
                } else {
                    tracing::warn!("Cannot resync: playback not active");
                }
            }
            Some(Action::Trigger) => {
                marker.set("trigger input");
                shared.trigger_abort("trigger input");
                let _ = player.stop();
                break;
            }
            Some(Action::Quit) => {
                tracing::info!("Quit requested");
                let _ = player.stop();
                break;
            }
            None => {}
        }

        std::thread::sleep(poll_interval);
    }

    tracing::info!("Input loop ended");
}
