//! Retry scheduler.
//!
//! # Responsibilities
//! - Hold tripped invocation records ordered by next-eligible time
//! - Hand each record to the replay pool once it becomes eligible
//! - Act on the replay outcome: clear the trip, reschedule, or alert
//!
//! # Data Flow
//! ```text
//! CallGate trip → submit() → WaitingQueue (min-heap, FIFO on ties)
//!     dispatcher: sleep until earliest deadline (or a new record)
//!     → ReplayPool::submit(record)
//!         → replay ok      → TripRegistry::clear
//!         → replay failed  → retry_count += 1
//!             → < max_retry  → next_eligible = now + backoff → WaitingQueue
//!             → >= max_retry → TripRegistry::mark_exhausted + AlertRouter::notify
//! ```
//!
//! # Design Decisions
//! - Exactly one dispatcher, run under a supervisor that restarts it if it
//!   panics; one bad record never stops the others
//! - Pool saturation is not a replay failure: the record goes back to the
//!   queue one retry interval later without consuming a retry
//! - Shutdown closes the queue to new submissions, so no record is
//!   accepted that nothing would ever dispatch
//! - All waits use Tokio's clock, so tests can pause and advance time

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::alert::AlertRouter;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::error::PoolError;
use crate::resilience::pool::{ReplayPool, Rejected};
use crate::resilience::record::InvocationRecord;
use crate::resilience::registry::TripRegistry;

/// Replay pool sizing and shutdown grace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub shutdown_grace: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 96,
            shutdown_grace: Duration::from_secs(23),
        }
    }
}

/// Time-ordered waiting collection of invocation records.
#[derive(Debug, Default)]
pub struct WaitingQueue {
    heap: Mutex<BinaryHeap<Reverse<InvocationRecord>>>,
    closed: AtomicBool,
    wake: Notify,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BinaryHeap<Reverse<InvocationRecord>>> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a record and wake the dispatcher.
    pub fn push(&self, record: InvocationRecord) {
        self.lock().push(Reverse(record));
        self.wake.notify_one();
    }

    /// Add a record unless the queue has been closed. A closed queue hands
    /// the record back.
    pub fn try_push(&self, record: InvocationRecord) -> Result<(), InvocationRecord> {
        let mut heap = self.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(record);
        }
        heap.push(Reverse(record));
        drop(heap);
        self.wake.notify_one();
        Ok(())
    }

    /// Refuse further `try_push` calls. Records already queued stay.
    pub fn close(&self) {
        let _heap = self.lock();
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Eligibility time of the earliest record.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().peek().map(|Reverse(record)| record.next_eligible())
    }

    /// Remove the earliest record if it is eligible at `now`.
    pub fn pop_due(&self, now: Instant) -> Option<InvocationRecord> {
        let mut heap = self.lock();
        match heap.peek() {
            Some(Reverse(record)) if record.next_eligible() <= now => {
                heap.pop().map(|Reverse(record)| record)
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    async fn notified(&self) {
        self.wake.notified().await;
    }
}

/// State shared by the dispatcher and the replay workers.
#[derive(Debug)]
struct SchedulerShared {
    queue: WaitingQueue,
    registry: Arc<TripRegistry>,
    alerts: AlertRouter,
}

/// Owns tripped records and drives their replays.
#[derive(Debug)]
pub struct RetryScheduler {
    shared: Arc<SchedulerShared>,
    pool: Arc<ReplayPool<InvocationRecord>>,
    shutdown: Shutdown,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    grace: Duration,
}

impl RetryScheduler {
    /// Start the dispatcher and the replay pool. Must be called from within a
    /// Tokio runtime.
    pub fn start(settings: SchedulerSettings, registry: Arc<TripRegistry>, alerts: AlertRouter) -> Self {
        let shared = Arc::new(SchedulerShared {
            queue: WaitingQueue::new(),
            registry,
            alerts,
        });

        let worker_shared = shared.clone();
        let pool = Arc::new(ReplayPool::start(
            settings.workers,
            settings.queue_capacity,
            move |record| replay(worker_shared.clone(), record),
        ));

        let shutdown = Shutdown::new();
        let dispatcher = {
            let (shared, pool, shutdown) = (shared.clone(), pool.clone(), shutdown.clone());
            move || dispatch(shared.clone(), pool.clone(), shutdown.clone())
        };
        let supervisor = tokio::spawn(supervise(shutdown.clone(), dispatcher));

        Self {
            shared,
            pool,
            shutdown,
            supervisor: Mutex::new(Some(supervisor)),
            grace: settings.shutdown_grace,
        }
    }

    /// Take ownership of a tripped record. Fails once shutdown has begun.
    pub fn submit(&self, record: InvocationRecord) -> Result<(), PoolError> {
        let (id, episode) = (record.id().clone(), record.episode());
        self.shared.queue.try_push(record).map_err(|_| PoolError::ShutDown)?;
        tracing::debug!(guard = %id, episode = %episode, "Record scheduled for replay");
        Ok(())
    }

    /// Records waiting for their next replay.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn registry(&self) -> &Arc<TripRegistry> {
        &self.shared.registry
    }

    pub fn alerts(&self) -> &AlertRouter {
        &self.shared.alerts
    }

    /// Stop the dispatcher, then drain the pool within the grace period.
    /// Records still waiting are dropped. Idempotent.
    pub async fn shutdown(&self) {
        self.shared.queue.close();
        self.shutdown.trigger();
        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(supervisor) = supervisor {
            if let Err(e) = supervisor.await {
                tracing::error!(error = %e, "Retry dispatcher supervisor failed");
            }
        }
        self.pool.shutdown(self.grace).await;

        let dropped = self.shared.queue.len();
        if dropped > 0 {
            tracing::warn!(dropped, "Retry scheduler stopped with records still waiting");
        }
    }
}

/// Keep exactly one dispatcher alive until shutdown.
async fn supervise<F, Fut>(shutdown: Shutdown, dispatcher: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Retry dispatcher started");
    loop {
        let task = tokio::spawn(dispatcher());
        match task.await {
            Ok(()) => break,
            Err(e) if e.is_panic() && !shutdown.is_triggered() => {
                tracing::error!(error = %e, "Retry dispatcher panicked, restarting");
                metrics::record_dispatcher_restart();
            }
            Err(e) => {
                tracing::error!(error = %e, "Retry dispatcher stopped unexpectedly");
                break;
            }
        }
    }
    tracing::info!("Retry dispatcher stopped");
}

async fn dispatch(shared: Arc<SchedulerShared>, pool: Arc<ReplayPool<InvocationRecord>>, shutdown: Shutdown) {
    let mut shutdown_rx = shutdown.subscribe();

    while !shutdown.is_triggered() {
        let now = Instant::now();
        if let Some(record) = shared.queue.pop_due(now) {
            hand_off(&shared, &pool, record);
            continue;
        }

        let deadline = shared.queue.next_deadline();
        let wait = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = wait => {}
            _ = shared.queue.notified() => {}
            _ = shutdown_rx.recv() => break,
        }
    }
}

fn hand_off(shared: &SchedulerShared, pool: &ReplayPool<InvocationRecord>, record: InvocationRecord) {
    tracing::debug!(
        guard = %record.id(),
        episode = %record.episode(),
        retry = record.retry_count(),
        "Dispatching replay"
    );

    if let Err(Rejected { error, mut item }) = pool.submit(record) {
        metrics::record_pool_rejection();
        let delay = item.guard().policy().retry_interval;
        tracing::error!(
            guard = %item.id(),
            episode = %item.episode(),
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "Replay rejected by pool, rescheduling"
        );
        item.reschedule(Instant::now() + delay);
        shared.queue.push(item);
    }
}

/// Replay one record on a pool worker and act on the outcome.
async fn replay(shared: Arc<SchedulerShared>, mut record: InvocationRecord) {
    let guard = record.guard().clone();
    let id = guard.id();
    let policy = guard.policy();

    match record.replay().await {
        Ok(()) => {
            metrics::record_replay(id.as_str(), true);
            if shared.registry.clear(id, record.episode()) {
                tracing::info!(
                    guard = %id,
                    episode = %record.episode(),
                    retries = record.retry_count(),
                    "Replay succeeded, guard closed"
                );
            }
        }
        Err(e) => {
            metrics::record_replay(id.as_str(), false);
            record.set_last_error(&e);
            let attempts = record.incr_retry_count();

            if attempts >= policy.max_retry {
                tracing::warn!(
                    guard = %id,
                    episode = %record.episode(),
                    retries = attempts,
                    error = %e,
                    "Replay failed, retries exhausted"
                );
                shared.registry.mark_exhausted(id, record.episode());
                shared.alerts.notify(policy.alert.as_deref(), &record.summary());
            } else {
                let delay = policy.backoff.delay(policy.retry_interval, attempts);
                tracing::info!(
                    guard = %id,
                    episode = %record.episode(),
                    retry = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Replay failed, rescheduling"
                );
                record.reschedule(Instant::now() + delay);
                shared.queue.push(record);
            }
        }
    }
}
