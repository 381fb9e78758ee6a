//! Stop detection

use crate::config::MonitorConfig;
use crate::types::{ProgressMark, RecoveryReason};
use crate::vendor::RunState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a run at one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunClass {
    Running,
    Completed,
    Cancelled,
    /// Non-terminal without progress for longer than the idle window
    Stuck,
    Error,
}

/// What the orchestrator should do with a classified run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    /// Keep polling
    InProgress,
    /// Finished with acceptable output
    Finished,
    /// Stopped early; continue from where it got to
    NeedsRecovery(RecoveryReason),
}

/// Outcome of checking the campaign's recovery budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Recover automatically; carries the attempt number being started
    Recover { attempt: u32 },
    /// Budget spent; surface to an operator
    Escalate,
}

/// Stateless stop detector.
///
/// The recovery attempt count lives on the campaign record so it survives
/// restarts; the detector only applies thresholds.
#[derive(Debug, Clone)]
pub struct StopDetector {
    idle_threshold: Duration,
    max_recovery_attempts: u32,
    min_pages_floor: u32,
    min_records_floor: u64,
}

impl StopDetector {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            idle_threshold: i64::try_from(config.idle_threshold_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            max_recovery_attempts: config.max_recovery_attempts,
            min_pages_floor: config.min_pages_floor,
            min_records_floor: config.min_records_floor,
        }
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    /// Classify a run from its vendor state and last progress mark.
    ///
    /// Terminal vendor states are never stuck. A non-terminal run is stuck
    /// only once `now - changed_at` strictly exceeds the idle threshold.
    pub fn classify(&self, state: &RunState, mark: &ProgressMark, now: DateTime<Utc>) -> RunClass {
        match state {
            RunState::Completed => RunClass::Completed,
            RunState::Cancelled => RunClass::Cancelled,
            RunState::Errored => RunClass::Error,
            RunState::Queued | RunState::Running | RunState::Unknown(_) => {
                if now - mark.changed_at > self.idle_threshold {
                    RunClass::Stuck
                } else {
                    RunClass::Running
                }
            }
        }
    }

    /// Completed output below both floors. The page floor never exceeds
    /// the pages the iteration was planned to cover.
    pub fn is_low_yield(&self, pages: u32, records: u64, planned_pages: u32) -> bool {
        let page_floor = self.min_pages_floor.min(planned_pages);
        pages < page_floor && records < self.min_records_floor
    }

    pub fn assess(&self, class: RunClass, pages: u32, records: u64, planned_pages: u32) -> Assessment {
        match class {
            RunClass::Running => Assessment::InProgress,
            RunClass::Completed if self.is_low_yield(pages, records, planned_pages) => {
                Assessment::NeedsRecovery(RecoveryReason::LowYield)
            }
            RunClass::Completed => Assessment::Finished,
            RunClass::Cancelled => Assessment::NeedsRecovery(RecoveryReason::Cancelled),
            RunClass::Stuck => Assessment::NeedsRecovery(RecoveryReason::Stuck),
            RunClass::Error => Assessment::NeedsRecovery(RecoveryReason::Errored),
        }
    }

    /// Whether another automatic recovery is allowed after `attempts_so_far`
    pub fn recovery_decision(&self, attempts_so_far: u32) -> RecoveryDecision {
        if attempts_so_far >= self.max_recovery_attempts {
            RecoveryDecision::Escalate
        } else {
            RecoveryDecision::Recover { attempt: attempts_so_far + 1 }
        }
    }
}

impl Default for StopDetector {
    fn default() -> Self {
        Self::new(&MonitorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark_at(at: DateTime<Utc>) -> ProgressMark {
        ProgressMark { pages: 3, records: 40, changed_at: at }
    }

    #[test]
    fn test_stuck_only_after_idle_window_strictly_elapsed() {
        let detector = StopDetector::default();
        let t0 = Utc::now();
        let mark = mark_at(t0);

        let at_threshold = t0 + Duration::seconds(300);
        assert_eq!(detector.classify(&RunState::Running, &mark, at_threshold), RunClass::Running);

        let past = t0 + Duration::seconds(301);
        assert_eq!(detector.classify(&RunState::Running, &mark, past), RunClass::Stuck);
        assert_eq!(detector.classify(&RunState::Queued, &mark, past), RunClass::Stuck);
    }

    #[test]
    fn test_oversized_idle_window_saturates() {
        let config = MonitorConfig {
            idle_threshold_secs: u64::MAX,
            ..MonitorConfig::default()
        };
        let detector = StopDetector::new(&config);
        assert_eq!(detector.idle_threshold(), Duration::MAX);

        let t0 = Utc::now();
        let later = t0 + Duration::days(365);
        assert_eq!(detector.classify(&RunState::Running, &mark_at(t0), later), RunClass::Running);
    }

    #[test]
    fn test_terminal_states_never_stuck() {
        let detector = StopDetector::default();
        let t0 = Utc::now();
        let later = t0 + Duration::hours(5);
        let mark = mark_at(t0);
        assert_eq!(detector.classify(&RunState::Completed, &mark, later), RunClass::Completed);
        assert_eq!(detector.classify(&RunState::Cancelled, &mark, later), RunClass::Cancelled);
        assert_eq!(detector.classify(&RunState::Errored, &mark, later), RunClass::Error);
    }

    #[test]
    fn test_low_yield_completion_needs_recovery() {
        let detector = StopDetector::default();
        assert_eq!(
            detector.assess(RunClass::Completed, 2, 10, 5),
            Assessment::NeedsRecovery(RecoveryReason::LowYield)
        );
        // Enough records
        assert_eq!(detector.assess(RunClass::Completed, 2, 20, 5), Assessment::Finished);
        // Enough pages
        assert_eq!(detector.assess(RunClass::Completed, 5, 0, 5), Assessment::Finished);
        // Short final iteration: floor shrinks to the planned range
        assert_eq!(detector.assess(RunClass::Completed, 2, 3, 2), Assessment::Finished);
    }

    #[test]
    fn test_assess_maps_stop_reasons() {
        let detector = StopDetector::default();
        assert_eq!(detector.assess(RunClass::Running, 0, 0, 5), Assessment::InProgress);
        assert_eq!(
            detector.assess(RunClass::Stuck, 1, 1, 5),
            Assessment::NeedsRecovery(RecoveryReason::Stuck)
        );
        assert_eq!(
            detector.assess(RunClass::Cancelled, 9, 900, 5),
            Assessment::NeedsRecovery(RecoveryReason::Cancelled)
        );
        assert_eq!(
            detector.assess(RunClass::Error, 9, 900, 5),
            Assessment::NeedsRecovery(RecoveryReason::Errored)
        );
    }

    #[test]
    fn test_recovery_cap() {
        let detector = StopDetector::default();
        assert_eq!(detector.recovery_decision(0), RecoveryDecision::Recover { attempt: 1 });
        assert_eq!(detector.recovery_decision(2), RecoveryDecision::Recover { attempt: 3 });
        assert_eq!(detector.recovery_decision(3), RecoveryDecision::Escalate);
        assert_eq!(detector.recovery_decision(7), RecoveryDecision::Escalate);
    }
}
