//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use retry_breaker::alert::AlertSink;
use retry_breaker::resilience::RecordSummary;
use retry_breaker::{AlertRouter, CircuitBreaker, SchedulerSettings};

pub const RECORDING_ALERT: &str = "recording";

/// An operation whose health can be switched at runtime.
#[derive(Debug)]
pub struct FlakyOp {
    healthy: AtomicBool,
    calls: AtomicU32,
}

impl FlakyOp {
    pub fn new(healthy: bool) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(healthy),
            calls: AtomicU32::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Invocations so far, replays included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call(&self) -> Result<u32, String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.healthy.load(Ordering::SeqCst) {
            Ok(n)
        } else {
            Err(format!("call {n} failed"))
        }
    }
}

/// The closure a caller hands to the gate for `op`.
pub fn invoke(op: &Arc<FlakyOp>) -> impl Fn() -> BoxFuture<'static, Result<u32, String>> + Send + Sync + 'static {
    let op = op.clone();
    move || {
        let op = op.clone();
        async move { op.call() }.boxed()
    }
}

/// Sentinel value returned by [`fallback`].
pub const FALLBACK: u32 = u32::MAX;

pub fn fallback() -> impl FnOnce() -> BoxFuture<'static, Result<u32, String>> {
    || async { Ok(FALLBACK) }.boxed()
}

/// Alert sink that keeps every summary it receives.
#[derive(Debug, Default)]
pub struct RecordingAlert {
    summaries: Mutex<Vec<RecordSummary>>,
}

impl RecordingAlert {
    pub fn summaries(&self) -> Vec<RecordSummary> {
        self.summaries.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlert {
    fn notify(&self, summary: &RecordSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}

/// A breaker whose default alert sink is `alert`.
pub fn breaker_with(alert: Arc<RecordingAlert>) -> CircuitBreaker {
    let alerts = AlertRouter::new()
        .with_sink(RECORDING_ALERT, alert)
        .with_default(RECORDING_ALERT)
        .unwrap();
    CircuitBreaker::start(SchedulerSettings::default(), alerts)
}

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
