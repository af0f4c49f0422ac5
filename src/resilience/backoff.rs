//! Replay delay policy.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the delay before the next replay grows with failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Every replay waits the retry interval.
    #[default]
    Fixed,
    /// The retry interval doubles per failed replay, capped, with jitter.
    Exponential,
}

/// Delay policy attached to a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub max: Duration,
}

impl Backoff {
    pub fn fixed() -> Self {
        Self {
            kind: BackoffKind::Fixed,
            max: Duration::MAX,
        }
    }

    pub fn exponential(max: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            max,
        }
    }

    /// Delay before the replay that follows `failed_attempts` failed replays.
    ///
    /// `failed_attempts == 0` is the first replay after the trip and always
    /// waits exactly `interval`.
    pub fn delay(&self, interval: Duration, failed_attempts: u32) -> Duration {
        match self.kind {
            BackoffKind::Fixed => interval,
            BackoffKind::Exponential => {
                let base_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
                let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
                calculate_backoff(failed_attempts + 1, base_ms, max_ms.max(base_ms))
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::fixed()
    }
}

/// Exponential backoff with up to 10% jitter. `attempt` is 1-based.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay.saturating_add(jitter))
}
