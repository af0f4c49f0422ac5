//! Guard registration: identity, policy and arbiter of one guarded operation.

use std::time::Duration;

use crate::resilience::arbiter::FailureRateArbiter;
use crate::resilience::backoff::Backoff;
use crate::resilience::identity::OperationId;

/// Parameters a guarded operation is registered with.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardPolicy {
    /// Highest tolerable failure rate, 0.0 to 1.0.
    pub threshold: f64,
    /// Length of the counting window.
    pub window: Duration,
    /// Failed replays before the alert is raised.
    pub max_retry: u32,
    /// Delay before the first replay (and the base for backoff).
    pub retry_interval: Duration,
    pub backoff: Backoff,
    /// Name of the fallback, for logs and alert summaries.
    pub fallback: Option<String>,
    /// Alert sink name; `None` uses the breaker's default sink.
    pub alert: Option<String>,
}

impl GuardPolicy {
    pub fn new(threshold: f64, window: Duration) -> Self {
        Self {
            threshold,
            window,
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, max_retry: u32, retry_interval: Duration) -> Self {
        self.max_retry = max_retry;
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    pub fn with_alert(mut self, name: impl Into<String>) -> Self {
        self.alert = Some(name.into());
        self
    }

    /// Sanity check, returning the first problem found.
    pub fn check(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!("threshold {} is outside [0, 1]", self.threshold));
        }
        if self.window.is_zero() {
            return Err("window must be non-zero".to_string());
        }
        if self.max_retry == 0 {
            return Err("max_retry must be at least 1".to_string());
        }
        if self.retry_interval.is_zero() {
            return Err("retry_interval must be non-zero".to_string());
        }
        Ok(())
    }
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            window: Duration::from_secs(5),
            max_retry: 3,
            retry_interval: Duration::from_millis(5000),
            backoff: Backoff::fixed(),
            fallback: None,
            alert: None,
        }
    }
}

/// A registered guarded operation.
#[derive(Debug)]
pub struct Guard {
    id: OperationId,
    policy: GuardPolicy,
    arbiter: FailureRateArbiter,
}

impl Guard {
    pub(crate) fn new(id: OperationId, policy: GuardPolicy) -> Self {
        Self {
            id,
            policy,
            arbiter: FailureRateArbiter::new(),
        }
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    pub fn arbiter(&self) -> &FailureRateArbiter {
        &self.arbiter
    }
}
