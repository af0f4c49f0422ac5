//! Invocation records: replayable captures of a tripped call.
//!
//! A record is created by the call gate when a guard trips and is owned by
//! the retry scheduler from then on. Records order by next-eligible time,
//! ties broken by submission sequence (FIFO).

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::resilience::error::ReplayError;
use crate::resilience::guard::Guard;
use crate::resilience::identity::OperationId;

/// Re-runs the original (non-gated) operation with its captured arguments.
pub type ReplayFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), ReplayError>> + Send + Sync>;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    NEXT_SEQ.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Wrap an operation closure as a replay, discarding its value.
pub fn replay_fn<F, Fut, T, E>(invoke: Arc<F>) -> ReplayFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    Arc::new(move || {
        let call = (invoke.as_ref())();
        async move {
            call.await
                .map(|_| ())
                .map_err(|e| ReplayError::Failed(e.to_string()))
        }
        .boxed()
    })
}

/// What an alert sink is told about an exhausted trip.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub episode: Uuid,
    pub operation: OperationId,
    pub fallback: Option<String>,
    pub retries: u32,
    pub max_retry: u32,
    /// Milliseconds since the Unix epoch.
    pub tripped_at_ms: u64,
    pub last_error: Option<String>,
    /// Tally of the guard's current window.
    pub successes: u64,
    pub failures: u64,
}

/// One tripped call awaiting replay.
pub struct InvocationRecord {
    seq: u64,
    episode: Uuid,
    guard: Arc<Guard>,
    replay: ReplayFn,
    next_eligible: Instant,
    retry_count: u32,
    tripped_at: SystemTime,
    last_error: Option<String>,
}

impl InvocationRecord {
    pub fn new(guard: Arc<Guard>, replay: ReplayFn, next_eligible: Instant) -> Self {
        Self {
            seq: next_seq(),
            episode: Uuid::new_v4(),
            guard,
            replay,
            next_eligible,
            retry_count: 0,
            tripped_at: SystemTime::now(),
            last_error: None,
        }
    }

    /// Use a caller-chosen episode ID (the one recorded in the registry).
    pub fn with_episode(mut self, episode: Uuid) -> Self {
        self.episode = episode;
        self
    }

    pub fn id(&self) -> &OperationId {
        self.guard.id()
    }

    pub fn guard(&self) -> &Arc<Guard> {
        &self.guard
    }

    pub fn episode(&self) -> Uuid {
        self.episode
    }

    pub fn next_eligible(&self) -> Instant {
        self.next_eligible
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn incr_retry_count(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    pub fn set_last_error(&mut self, error: &ReplayError) {
        self.last_error = Some(error.to_string());
    }

    /// Move the record to `at`. It queues behind records already due at `at`.
    pub fn reschedule(&mut self, at: Instant) {
        self.next_eligible = at;
        self.seq = next_seq();
    }

    /// Run the captured operation once. Errors and panics both come back as
    /// `Err`.
    pub async fn replay(&self) -> Result<(), ReplayError> {
        match AssertUnwindSafe((self.replay)()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                Err(ReplayError::Panicked(msg))
            }
        }
    }

    pub fn summary(&self) -> RecordSummary {
        let tally = self.guard.arbiter().snapshot();
        RecordSummary {
            episode: self.episode,
            operation: self.guard.id().clone(),
            fallback: self.guard.policy().fallback.clone(),
            retries: self.retry_count,
            max_retry: self.guard.policy().max_retry,
            tripped_at_ms: self
                .tripped_at
                .duration_since(UNIX_EPOCH)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or_default(),
            last_error: self.last_error.clone(),
            successes: tally.successes,
            failures: tally.failures,
        }
    }
}

impl fmt::Debug for InvocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationRecord")
            .field("seq", &self.seq)
            .field("episode", &self.episode)
            .field("operation", self.guard.id())
            .field("next_eligible", &self.next_eligible)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

impl PartialEq for InvocationRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InvocationRecord {}

impl PartialOrd for InvocationRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InvocationRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.next_eligible
            .cmp(&other.next_eligible)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::guard::GuardPolicy;
    use std::time::Duration;

    fn guard(name: &str) -> Arc<Guard> {
        Arc::new(Guard::new(OperationId::new(name), GuardPolicy::default()))
    }

    fn noop() -> ReplayFn {
        replay_fn(Arc::new(|| async { Ok::<_, String>(()) }))
    }

    #[test]
    fn test_orders_by_eligibility_then_submission() {
        let now = Instant::now();
        let late = InvocationRecord::new(guard("a"), noop(), now + Duration::from_secs(3));
        let early = InvocationRecord::new(guard("b"), noop(), now + Duration::from_secs(1));
        let tie_first = InvocationRecord::new(guard("c"), noop(), now + Duration::from_secs(2));
        let tie_second = InvocationRecord::new(guard("d"), noop(), now + Duration::from_secs(2));

        let mut records = vec![late, tie_second, early, tie_first];
        records.sort();
        let order: Vec<_> = records.iter().map(|r| r.id().as_str().to_string()).collect();
        assert_eq!(order, vec!["b", "c", "d", "a"]);
    }

    #[tokio::test]
    async fn test_replay_maps_errors_and_panics() {
        let ok = InvocationRecord::new(guard("ok"), noop(), Instant::now());
        assert_eq!(ok.replay().await, Ok(()));

        let failing = replay_fn(Arc::new(|| async { Err::<(), _>("connection refused") }));
        let failed = InvocationRecord::new(guard("err"), failing, Instant::now());
        assert_eq!(
            failed.replay().await,
            Err(ReplayError::Failed("connection refused".into()))
        );

        let panicking: ReplayFn = Arc::new(|| {
            async {
                if true {
                    panic!("boom");
                }
                Ok::<(), ReplayError>(())
            }
            .boxed()
        });
        let panicked = InvocationRecord::new(guard("panic"), panicking, Instant::now());
        assert_eq!(panicked.replay().await, Err(ReplayError::Panicked("boom".into())));
    }

    #[test]
    fn test_summary_reports_retries() {
        let mut record = InvocationRecord::new(guard("orders.submit"), noop(), Instant::now());
        record.incr_retry_count();
        record.set_last_error(&ReplayError::Failed("timeout".into()));
        let summary = record.summary();
        assert_eq!(summary.retries, 1);
        assert_eq!(summary.max_retry, 3);
        assert_eq!(summary.operation.as_str(), "orders.submit");
        assert_eq!(summary.last_error.as_deref(), Some("replay failed: timeout"));
    }
}
