//! Bounded replay worker pool.
//!
//! # Responsibilities
//! - Run replays with bounded concurrency
//! - Reject hand-offs when the queue is full instead of growing it
//! - Drain within a grace period on shutdown, then abort what is left
//!
//! # Design Decisions
//! - `try_send` on a bounded channel: saturation is reported to the caller,
//!   and the rejected item is handed back so it is never lost
//! - A semaphore caps concurrent replays; a JoinSet tracks them so that
//!   aborting the runner aborts every in-flight replay with it

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::resilience::error::PoolError;

/// A hand-off the pool refused, with the item given back.
pub struct Rejected<T> {
    pub error: PoolError,
    pub item: T,
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").field("error", &self.error).finish_non_exhaustive()
    }
}

/// Fixed-size pool of workers behind a bounded queue.
pub struct ReplayPool<T> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
    runner: Mutex<Option<JoinHandle<()>>>,
    workers: usize,
    capacity: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Send + 'static> ReplayPool<T> {
    /// Start the pool; every accepted item is passed to `handler` on a worker.
    /// Must be called from within a Tokio runtime.
    pub fn start<F, Fut>(workers: usize, capacity: usize, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let runner = tokio::spawn(run_workers(rx, workers, handler));

        tracing::info!(workers, queue_capacity = capacity, "Replay pool started");

        Self {
            tx: Mutex::new(Some(tx)),
            runner: Mutex::new(Some(runner)),
            workers,
            capacity,
        }
    }

    /// Queue an item without waiting.
    pub fn submit(&self, item: T) -> Result<(), Rejected<T>> {
        let tx = lock(&self.tx);
        let Some(tx) = tx.as_ref() else {
            return Err(Rejected {
                error: PoolError::ShutDown,
                item,
            });
        };
        tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) => Rejected {
                error: PoolError::Saturated {
                    capacity: self.capacity,
                },
                item,
            },
            mpsc::error::TrySendError::Closed(item) => Rejected {
                error: PoolError::ShutDown,
                item,
            },
        })
    }
}

impl<T> ReplayPool<T> {
    /// Stop accepting items, give queued and running work `grace` to finish,
    /// then abort the rest. Idempotent.
    pub async fn shutdown(&self, grace: Duration) {
        drop(lock(&self.tx).take());
        let runner = lock(&self.runner).take();
        let Some(mut runner) = runner else {
            return;
        };

        tracing::info!(grace_secs = grace.as_secs(), "Shutting down replay pool...");
        match tokio::time::timeout(grace, &mut runner).await {
            Ok(_) => tracing::info!("Replay pool drained"),
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Replay pool did not drain within grace period, aborting remaining replays"
                );
                runner.abort();
            }
        }
    }

    pub fn is_accepting(&self) -> bool {
        lock(&self.tx).is_some()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for ReplayPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayPool")
            .field("workers", &self.workers)
            .field("capacity", &self.capacity)
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

async fn run_workers<T, F, Fut>(mut rx: mpsc::Receiver<T>, workers: usize, handler: F)
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let limit = Arc::new(Semaphore::new(workers));
    let mut in_flight = JoinSet::new();

    while let Some(item) = rx.recv().await {
        let Ok(permit) = limit.clone().acquire_owned().await else {
            break;
        };
        let work = handler(item);
        in_flight.spawn(async move {
            work.await;
            drop(permit);
        });
        while let Some(res) = in_flight.try_join_next() {
            log_join(res);
        }
    }

    while let Some(res) = in_flight.join_next().await {
        log_join(res);
    }
}

fn log_join(res: Result<(), JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            tracing::error!(error = %e, "Replay worker panicked");
        }
    }
}
