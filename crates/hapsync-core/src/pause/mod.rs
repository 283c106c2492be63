//! Pause budget with an append-only persisted ledger
//!
//! A session grants a limited number of pauses, each running a fixed,
//! non-preemptible countdown. Grants are recorded to the ledger before the
//! countdown starts, so a crash mid-pause cannot inflate the remaining
//! budget on restart. The ledger is append-only; the latest entry by
//! timestamp is authoritative at load time.

use crate::playback::PlaybackState;
use crate::session::SessionShared;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Pause budget when no ledger exists yet
pub const DEFAULT_MAX_PAUSES: u32 = 1;

/// Countdown length in seconds when no ledger exists yet
pub const DEFAULT_PAUSE_DURATION_S: f64 = 5.0;

/// Entries kept in the ledger file; older history is trimmed on write
const MAX_LEDGER_ENTRIES: usize = 50;

/// Abort-flag poll interval during a countdown
const COUNTDOWN_POLL: Duration = Duration::from_millis(100);

/// Errors loading or persisting the pause ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("ledger {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode ledger: {0}")]
    Encode(serde_json::Error),

    #[error("failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One persisted budget record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// When this entry was written (UTC); latest entry is authoritative
    pub timestamp: DateTime<Utc>,
    /// Pauses remaining after the mutation this entry records
    pub pauses_remaining: u32,
    /// Countdown length in seconds
    pub pause_duration_s: f64,
    /// Which component wrote the entry
    pub writer: String,
    /// Why the entry was written (e.g. "pause_used")
    pub reason: String,
}

/// On-disk ledger format: an append-only entry list
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PauseLedger {
    #[serde(default)]
    pub entries: Vec<LedgerEntry>,
}

impl PauseLedger {
    /// Load the ledger; a missing file is an empty ledger
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| LedgerError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No pause ledger found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(LedgerError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// The authoritative entry: latest by timestamp
    pub fn latest(&self) -> Option<&LedgerEntry> {
        self.entries.iter().max_by_key(|e| e.timestamp)
    }

    /// Append an entry and persist, trimming to the most recent entries
    pub fn append(&mut self, path: &Path, entry: LedgerEntry) -> Result<(), LedgerError> {
        tracing::info!(
            pauses_remaining = entry.pauses_remaining,
            reason = %entry.reason,
            "Recording pause ledger entry"
        );
        self.entries.push(entry);

        if self.entries.len() > MAX_LEDGER_ENTRIES {
            let excess = self.entries.len() - MAX_LEDGER_ENTRIES;
            self.entries.drain(..excess);
        }

        let json = serde_json::to_string_pretty(self).map_err(LedgerError::Encode)?;
        std::fs::write(path, json).map_err(|source| LedgerError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Live pause budget, exposed for display only
#[derive(Debug, Clone, Copy)]
pub struct PauseBudget {
    /// Pauses still available in this session
    pub pauses_remaining: u32,
    /// Countdown length in seconds
    pub pause_duration_s: f64,
    /// Pauses consumed in this session
    pub pauses_used_this_session: u32,
}

/// How a countdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// Ran its full duration; playback should resume
    Completed,
    /// Interrupted by the global abort trigger; the session ends, no resume
    Aborted,
}

/// Grants pauses against the persisted budget and runs countdowns
#[derive(Debug)]
pub struct PauseBudgetController {
    budget: PauseBudget,
    ledger: PauseLedger,
    ledger_path: PathBuf,
}

impl PauseBudgetController {
    /// Load the controller from the ledger at `path`
    ///
    /// The latest entry by timestamp is authoritative; a missing ledger
    /// falls back to the default allotment.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let ledger_path = path.into();
        let ledger = PauseLedger::load(&ledger_path)?;

        let budget = match ledger.latest() {
            Some(entry) => {
                tracing::info!(
                    entries = ledger.entries.len(),
                    pauses_remaining = entry.pauses_remaining,
                    pause_duration_s = entry.pause_duration_s,
                    "Loaded pause budget from ledger"
                );
                for (i, e) in ledger.entries.iter().enumerate() {
                    tracing::debug!(
                        index = i + 1,
                        timestamp = %e.timestamp,
                        writer = %e.writer,
                        pauses_remaining = e.pauses_remaining,
                        reason = %e.reason,
                        "Ledger history"
                    );
                }
                PauseBudget {
                    pauses_remaining: entry.pauses_remaining,
                    pause_duration_s: entry.pause_duration_s,
                    pauses_used_this_session: 0,
                }
            }
            None => PauseBudget {
                pauses_remaining: DEFAULT_MAX_PAUSES,
                pause_duration_s: DEFAULT_PAUSE_DURATION_S,
                pauses_used_this_session: 0,
            },
        };

        Ok(Self {
            budget,
            ledger,
            ledger_path,
        })
    }

    /// Current budget, for display
    pub fn budget(&self) -> PauseBudget {
        self.budget
    }

    /// Countdown length for a granted pause
    pub fn pause_duration(&self) -> Duration {
        Duration::from_secs_f64(self.budget.pause_duration_s)
    }

    /// Request a pause
    ///
    /// Granted only while playback is Playing and pauses remain. A grant is
    /// persisted to the ledger before it takes effect; if the write fails
    /// the request is denied and the in-memory budget is untouched.
    pub fn try_pause(&mut self, state: PlaybackState) -> bool {
        if self.budget.pauses_remaining == 0 {
            tracing::warn!("Pause denied: no pauses remaining");
            return false;
        }
        if state != PlaybackState::Playing {
            tracing::warn!(?state, "Pause denied: playback not active");
            return false;
        }

        let entry = LedgerEntry {
            timestamp: Utc::now(),
            pauses_remaining: self.budget.pauses_remaining - 1,
            pause_duration_s: self.budget.pause_duration_s,
            writer: "hapsync".to_string(),
            reason: "pause_used".to_string(),
        };

        if let Err(e) = self.ledger.append(&self.ledger_path, entry) {
            tracing::error!(error = %e, "Pause denied: ledger write failed");
            return false;
        }

        self.budget.pauses_remaining -= 1;
        self.budget.pauses_used_this_session += 1;
        tracing::info!(
            used = self.budget.pauses_used_this_session,
            remaining = self.budget.pauses_remaining,
            duration_s = self.budget.pause_duration_s,
            "Pause granted"
        );
        true
    }

    /// Run the fixed countdown for a granted pause
    ///
    /// Non-preemptible: no input shortens it. Only the global abort trigger
    /// interrupts it early, which ends the session rather than resuming.
    pub fn run_countdown(&self, shared: &SessionShared) -> CountdownOutcome {
        let duration = self.pause_duration();
        let started = Instant::now();
        let mut last_shown = u64::MAX;

        while started.elapsed() < duration {
            if shared.is_aborted() {
                tracing::warn!("Countdown interrupted by abort trigger");
                return CountdownOutcome::Aborted;
            }

            let remaining = duration.saturating_sub(started.elapsed()).as_secs();
            if remaining != last_shown {
                tracing::info!(remaining_s = remaining, "Paused");
                last_shown = remaining;
            }

            std::thread::sleep(COUNTDOWN_POLL);
        }

        tracing::info!("Pause countdown complete, resuming");
        CountdownOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pause_ledger.json");
        (dir, path)
    }

    #[test]
    fn test_defaults_when_no_ledger() {
        let (_dir, path) = temp_ledger();
        let ctrl = PauseBudgetController::load(&path).unwrap();
        assert_eq!(ctrl.budget().pauses_remaining, DEFAULT_MAX_PAUSES);
        assert_eq!(ctrl.budget().pause_duration_s, DEFAULT_PAUSE_DURATION_S);
        assert_eq!(ctrl.budget().pauses_used_this_session, 0);
    }

    #[test]
    fn test_latest_entry_is_authoritative() {
        let (_dir, path) = temp_ledger();
        let mut ledger = PauseLedger::default();

        // Older entry written second; load must still pick the newest
        ledger
            .append(
                &path,
                LedgerEntry {
                    timestamp: Utc::now(),
                    pauses_remaining: 3,
                    pause_duration_s: 7.0,
                    writer: "test".into(),
                    reason: "configured".into(),
                },
            )
            .unwrap();
        ledger
            .append(
                &path,
                LedgerEntry {
                    timestamp: Utc::now() - chrono::Duration::hours(1),
                    pauses_remaining: 9,
                    pause_duration_s: 1.0,
                    writer: "test".into(),
                    reason: "stale".into(),
                },
            )
            .unwrap();

        let ctrl = PauseBudgetController::load(&path).unwrap();
        assert_eq!(ctrl.budget().pauses_remaining, 3);
        assert_eq!(ctrl.budget().pause_duration_s, 7.0);
    }

    #[test]
    fn test_grant_decrements_and_persists_before_effect() {
        let (_dir, path) = temp_ledger();
        let mut ctrl = PauseBudgetController::load(&path).unwrap();

        assert!(ctrl.try_pause(PlaybackState::Playing));
        assert_eq!(ctrl.budget().pauses_remaining, 0);
        assert_eq!(ctrl.budget().pauses_used_this_session, 1);

        // A reload sees the decremented budget: the grant was durable
        let reloaded = PauseBudgetController::load(&path).unwrap();
        assert_eq!(reloaded.budget().pauses_remaining, 0);
    }

    #[test]
    fn test_deny_when_exhausted_regardless_of_state() {
        let (_dir, path) = temp_ledger();
        let mut ctrl = PauseBudgetController::load(&path).unwrap();
        assert!(ctrl.try_pause(PlaybackState::Playing));

        for state in [
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Idle,
            PlaybackState::Ended,
        ] {
            assert!(!ctrl.try_pause(state));
        }
        // Never decremented below zero, never double-counted
        assert_eq!(ctrl.budget().pauses_remaining, 0);
        assert_eq!(ctrl.budget().pauses_used_this_session, 1);
    }

    #[test]
    fn test_deny_when_not_playing() {
        let (_dir, path) = temp_ledger();
        let mut ctrl = PauseBudgetController::load(&path).unwrap();

        assert!(!ctrl.try_pause(PlaybackState::Paused));
        assert!(!ctrl.try_pause(PlaybackState::Idle));
        assert_eq!(ctrl.budget().pauses_remaining, DEFAULT_MAX_PAUSES);
    }

    #[test]
    fn test_ledger_trims_to_cap() {
        let (_dir, path) = temp_ledger();
        let mut ledger = PauseLedger::default();

        for i in 0..(MAX_LEDGER_ENTRIES + 10) {
            ledger
                .append(
                    &path,
                    LedgerEntry {
                        timestamp: Utc::now(),
                        pauses_remaining: i as u32,
                        pause_duration_s: 5.0,
                        writer: "test".into(),
                        reason: "fill".into(),
                    },
                )
                .unwrap();
        }

        assert_eq!(ledger.entries.len(), MAX_LEDGER_ENTRIES);
        let reloaded = PauseLedger::load(&path).unwrap();
        assert_eq!(reloaded.entries.len(), MAX_LEDGER_ENTRIES);
        // The newest entries survived the trim
        assert_eq!(
            reloaded.entries.last().unwrap().pauses_remaining,
            (MAX_LEDGER_ENTRIES + 9) as u32
        );
    }

    #[test]
    fn test_corrupt_ledger_is_an_error() {
        let (_dir, path) = temp_ledger();
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PauseBudgetController::load(&path),
            Err(LedgerError::Parse { .. })
        ));
    }

    #[test]
    fn test_countdown_completes_naturally() {
        let (_dir, path) = temp_ledger();
        let mut ledger = PauseLedger::default();
        ledger
            .append(
                &path,
                LedgerEntry {
                    timestamp: Utc::now(),
                    pauses_remaining: 1,
                    pause_duration_s: 0.3,
                    writer: "test".into(),
                    reason: "configured".into(),
                },
            )
            .unwrap();

        let ctrl = PauseBudgetController::load(&path).unwrap();
        let shared = SessionShared::new();

        let started = Instant::now();
        let outcome = ctrl.run_countdown(&shared);
        assert_eq!(outcome, CountdownOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn test_countdown_interrupted_by_abort() {
        let (_dir, path) = temp_ledger();
        let mut ledger = PauseLedger::default();
        ledger
            .append(
                &path,
                LedgerEntry {
                    timestamp: Utc::now(),
                    pauses_remaining: 1,
                    pause_duration_s: 30.0,
                    writer: "test".into(),
                    reason: "configured".into(),
                },
            )
            .unwrap();

        let ctrl = PauseBudgetController::load(&path).unwrap();
        let shared = std::sync::Arc::new(SessionShared::new());

        let aborter = std::sync::Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            aborter.trigger_abort("test abort");
        });

        let started = Instant::now();
        let outcome = ctrl.run_countdown(&shared);
        handle.join().unwrap();

        assert_eq!(outcome, CountdownOutcome::Aborted);
        // Interrupted long before the 30s duration
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
