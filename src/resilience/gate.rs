//! Call gate: the decision point every guarded call passes through.
//!
//! # States (per operation identity)
//! - Closed: identity not in the tripped registry; the real operation runs
//! - Open: identity tripped; the fallback runs instead
//!
//! # State Transitions
//! ```text
//! Closed → Open: after recording an outcome, failure rate > threshold
//!                (gate trips the registry and submits an invocation record)
//! Open → Closed: a scheduled replay succeeds (scheduler only)
//! ```
//!
//! # Design Decisions
//! - The caller always sees the real result (Closed) or the fallback's
//!   result (Open), untransformed
//! - The invocation record captures the raw operation closure, never the
//!   gate, so a replay cannot re-enter breaker logic
//! - Only the first caller to trip an identity submits a record
//! - A panicking operation is recorded as a failure, then the panic resumes
//! - A trip the scheduler refuses (after shutdown) is undone

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::arbiter::Outcome;
use crate::resilience::guard::Guard;
use crate::resilience::record::{replay_fn, InvocationRecord};
use crate::resilience::registry::TripRegistry;
use crate::resilience::scheduler::RetryScheduler;

/// Routes guarded calls to the real operation or its fallback.
#[derive(Debug, Clone)]
pub struct CallGate {
    registry: Arc<TripRegistry>,
    scheduler: Arc<RetryScheduler>,
}

impl CallGate {
    pub fn new(registry: Arc<TripRegistry>, scheduler: Arc<RetryScheduler>) -> Self {
        Self { registry, scheduler }
    }

    /// Whether calls for `guard` currently go to the fallback.
    pub fn is_open(&self, guard: &Guard) -> bool {
        self.registry.contains(guard.id())
    }

    /// Run one guarded call.
    ///
    /// `invoke` must call the original operation with its arguments captured;
    /// it is kept for replay if this call trips the guard.
    pub async fn gate<T, E, F, Fut, FB, FbFut>(&self, guard: &Arc<Guard>, invoke: F, fallback: FB) -> Result<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let id = guard.id();

        if self.registry.contains(id) {
            metrics::record_call(id.as_str(), "fallback");
            tracing::trace!(guard = %id, "Guard open, calling fallback");
            return fallback().await;
        }

        let invoke = Arc::new(invoke);
        let result = AssertUnwindSafe(async { (invoke.as_ref())().await })
            .catch_unwind()
            .await;

        // A panic counts as a failure and is resumed once recorded.
        let outcome = match &result {
            Ok(Ok(_)) => Outcome::Success,
            _ => Outcome::Failure,
        };
        self.observe(guard, invoke, outcome);

        match result {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    fn observe<T, E, F, Fut>(&self, guard: &Arc<Guard>, invoke: Arc<F>, outcome: Outcome)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let id = guard.id();
        metrics::record_call(
            id.as_str(),
            match outcome {
                Outcome::Success => "success",
                Outcome::Failure => "failure",
            },
        );

        let policy = guard.policy();
        let now = Instant::now();
        let tally = guard.arbiter().observe(outcome, policy.window, now);
        if tally.is_within_tolerance(policy.threshold) {
            return;
        }

        let Some(episode) = self.registry.trip(id) else {
            return;
        };
        metrics::record_trip(id.as_str());
        tracing::warn!(
            guard = %id,
            episode = %episode,
            successes = tally.successes,
            failures = tally.failures,
            threshold = policy.threshold,
            retry_in_ms = policy.retry_interval.as_millis() as u64,
            "Failure rate over threshold, guard open"
        );

        let record = InvocationRecord::new(guard.clone(), replay_fn(invoke), now + policy.retry_interval)
            .with_episode(episode);
        if let Err(e) = self.scheduler.submit(record) {
            // Nothing would ever replay it, so the trip is undone.
            self.registry.clear(id, episode);
            tracing::warn!(
                guard = %id,
                episode = %episode,
                error = %e,
                "Replay not accepted, guard left closed"
            );
        }
    }
}
