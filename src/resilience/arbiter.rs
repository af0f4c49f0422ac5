//! Failure-rate arbiter.
//!
//! # Responsibilities
//! - Tally successes and failures for one guarded operation
//! - Roll the tally over when the current window has elapsed
//! - Decide whether the observed failure rate is still tolerable
//!
//! # Design Decisions
//! - Fixed window, not a sliding log: O(1) memory and update cost
//! - Rollover and record happen under the same lock, so concurrent callers
//!   observe exactly one reset per window
//! - An empty tally is tolerable (no division by zero)

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Outcome of one completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Point-in-time view of an arbiter's tally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArbiterSnapshot {
    pub successes: u64,
    pub failures: u64,
}

impl ArbiterSnapshot {
    /// Observed failure rate, `None` when nothing has been recorded.
    pub fn failure_rate(&self) -> Option<f64> {
        let total = self.successes + self.failures;
        if total == 0 {
            None
        } else {
            Some(self.failures as f64 / total as f64)
        }
    }

    /// `true` iff `threshold >= failure rate`. An empty tally is tolerable.
    pub fn is_within_tolerance(&self, threshold: f64) -> bool {
        match self.failure_rate() {
            Some(rate) => threshold >= rate,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    successes: u64,
    failures: u64,
    window_expires: Option<Instant>,
}

impl Tally {
    fn snapshot(&self) -> ArbiterSnapshot {
        ArbiterSnapshot {
            successes: self.successes,
            failures: self.failures,
        }
    }
}

/// Per-operation success/failure counters over the current window.
#[derive(Debug, Default)]
pub struct FailureRateArbiter {
    tally: Mutex<Tally>,
}

impl FailureRateArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_success(&self) {
        self.lock().successes += 1;
    }

    pub fn record_failure(&self) {
        self.lock().failures += 1;
    }

    /// Zero both counters. The window expiry is left untouched.
    pub fn reset_window(&self) {
        let mut tally = self.lock();
        tally.successes = 0;
        tally.failures = 0;
    }

    pub fn is_within_tolerance(&self, threshold: f64) -> bool {
        self.snapshot().is_within_tolerance(threshold)
    }

    pub fn snapshot(&self) -> ArbiterSnapshot {
        self.lock().snapshot()
    }

    /// When the current window ends, if one has been opened.
    pub fn window_expires(&self) -> Option<Instant> {
        self.lock().window_expires
    }

    /// Record one outcome observed at `now`.
    ///
    /// If no window is open yet or `now` is at or past its expiry, the tally is
    /// reset and a new window of length `window` starts at `now` before the
    /// outcome is counted. Returns the tally including this outcome.
    pub fn observe(&self, outcome: Outcome, window: Duration, now: Instant) -> ArbiterSnapshot {
        let mut tally = self.lock();
        let expired = tally.window_expires.map_or(true, |expires| now >= expires);
        if expired {
            tally.successes = 0;
            tally.failures = 0;
            tally.window_expires = Some(now + window);
        }
        match outcome {
            Outcome::Success => tally.successes += 1,
            Outcome::Failure => tally.failures += 1,
        }
        tally.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tally_is_tolerable() {
        let arbiter = FailureRateArbiter::new();
        assert!(arbiter.is_within_tolerance(0.0));
        assert_eq!(arbiter.snapshot().failure_rate(), None);
    }

    #[test]
    fn test_tolerance_boundary() {
        let arbiter = FailureRateArbiter::new();
        arbiter.record_success();
        arbiter.record_failure();
        // rate == threshold is still tolerable
        assert!(arbiter.is_within_tolerance(0.5));
        assert!(!arbiter.is_within_tolerance(0.49));

        arbiter.record_failure();
        assert!(!arbiter.is_within_tolerance(0.5));
        assert!(arbiter.is_within_tolerance(1.0));
    }

    #[test]
    fn test_tolerance_matches_rate_for_all_small_tallies() {
        for successes in 0..6u64 {
            for failures in 0..6u64 {
                if successes + failures == 0 {
                    continue;
                }
                let snapshot = ArbiterSnapshot { successes, failures };
                let rate = failures as f64 / (successes + failures) as f64;
                for threshold in [0.0, 0.25, 0.5, 0.75, 1.0] {
                    assert_eq!(snapshot.is_within_tolerance(threshold), rate <= threshold);
                }
            }
        }
    }

    #[test]
    fn test_reset_window() {
        let arbiter = FailureRateArbiter::new();
        arbiter.record_failure();
        arbiter.record_success();
        arbiter.reset_window();
        assert_eq!(arbiter.snapshot(), ArbiterSnapshot { successes: 0, failures: 0 });
    }

    #[test]
    fn test_observe_rolls_over_at_expiry() {
        let arbiter = FailureRateArbiter::new();
        let window = Duration::from_secs(5);
        let start = Instant::now();

        arbiter.observe(Outcome::Failure, window, start);
        arbiter.observe(Outcome::Failure, window, start + Duration::from_secs(4));
        assert_eq!(arbiter.snapshot().failures, 2);
        assert_eq!(arbiter.window_expires(), Some(start + window));

        // Exactly at expiry: counters reset before this outcome is counted.
        let snapshot = arbiter.observe(Outcome::Success, window, start + window);
        assert_eq!(snapshot, ArbiterSnapshot { successes: 1, failures: 0 });
        assert_eq!(arbiter.window_expires(), Some(start + window + window));
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let arbiter = std::sync::Arc::new(FailureRateArbiter::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let arbiter = arbiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if i % 2 == 0 {
                            arbiter.record_success();
                        } else {
                            arbiter.record_failure();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(arbiter.snapshot(), ArbiterSnapshot { successes: 4000, failures: 4000 });
    }
}
