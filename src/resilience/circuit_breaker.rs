//! Circuit breaker facade.
//!
//! Owns the guard map, the tripped registry, the retry scheduler and the call
//! gate, and gives them one explicit lifecycle: [`CircuitBreaker::start`] /
//! [`CircuitBreaker::from_config`] to build, [`CircuitBreaker::shutdown`] to
//! tear down.
//!
//! # Design Decisions
//! - Per-operation breaker (not global); identities do not share counters
//! - Fail over to the fallback while open (no waiting for a timeout)
//! - Recovery is probed by replaying the tripping call in the background,
//!   not by letting live traffic through
//! - A guard whose replays are exhausted stays open until an operator calls
//!   [`CircuitBreaker::reset`]

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use url::Url;

use crate::alert::webhook::WEBHOOK_ALERT;
use crate::alert::{AlertRouter, WebhookAlert};
use crate::config::schema::{BreakerConfig, GuardConfig};
use crate::resilience::error::{BreakerError, BreakerResult};
use crate::resilience::gate::CallGate;
use crate::resilience::guard::{Guard, GuardPolicy};
use crate::resilience::identity::OperationId;
use crate::resilience::registry::{TripEntry, TripRegistry};
use crate::resilience::scheduler::{RetryScheduler, SchedulerSettings};

/// Process-scoped circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    guards: DashMap<OperationId, Arc<Guard>>,
    registry: Arc<TripRegistry>,
    scheduler: Arc<RetryScheduler>,
    gate: CallGate,
}

impl CircuitBreaker {
    /// Start the scheduler and replay pool. Must be called from within a
    /// Tokio runtime.
    pub fn start(settings: SchedulerSettings, alerts: AlertRouter) -> Self {
        let registry = Arc::new(TripRegistry::new());
        let scheduler = Arc::new(RetryScheduler::start(settings, registry.clone(), alerts));
        let gate = CallGate::new(registry.clone(), scheduler.clone());

        Self {
            guards: DashMap::new(),
            registry,
            scheduler,
            gate,
        }
    }

    /// Build from a validated config: alert sinks, pool, and every
    /// `[[guards]]` entry registered.
    pub fn from_config(config: &BreakerConfig) -> BreakerResult<Self> {
        let mut alerts = AlertRouter::new();
        if let Some(url) = &config.alert.webhook_url {
            let url = Url::parse(url).map_err(|e| BreakerError::AlertSetup {
                name: WEBHOOK_ALERT.to_string(),
                reason: e.to_string(),
            })?;
            let timeout = Duration::from_millis(config.alert.webhook_timeout_ms);
            alerts = alerts.with_sink(WEBHOOK_ALERT, Arc::new(WebhookAlert::new(url, timeout)));
        }
        let alerts = alerts.with_default(config.alert.default.clone())?;

        let breaker = Self::start(config.pool.settings(), alerts);
        for guard in &config.guards {
            breaker.register(OperationId::new(&guard.name), guard_policy(guard, config))?;
        }
        Ok(breaker)
    }

    /// Register a guarded operation.
    ///
    /// Registering an identity again with an equal policy returns the guard
    /// already registered (same arbiter); a different policy is an error.
    pub fn register(&self, id: OperationId, policy: GuardPolicy) -> BreakerResult<Arc<Guard>> {
        policy.check().map_err(|reason| BreakerError::InvalidPolicy {
            id: id.clone(),
            reason,
        })?;
        if let Some(alert) = &policy.alert {
            if !self.scheduler.alerts().contains(alert) {
                return Err(BreakerError::UnknownAlert(alert.clone()));
            }
        }

        match self.guards.entry(id.clone()) {
            Entry::Occupied(existing) => {
                if existing.get().policy() == &policy {
                    Ok(existing.get().clone())
                } else {
                    Err(BreakerError::ConflictingRegistration(id))
                }
            }
            Entry::Vacant(slot) => {
                tracing::info!(
                    guard = %id,
                    threshold = policy.threshold,
                    window_ms = policy.window.as_millis() as u64,
                    max_retry = policy.max_retry,
                    "Guard registered"
                );
                Ok(slot.insert(Arc::new(Guard::new(id, policy))).clone())
            }
        }
    }

    /// Look up a registered guard.
    pub fn guard(&self, id: &OperationId) -> BreakerResult<Arc<Guard>> {
        self.guards
            .get(id)
            .map(|g| g.value().clone())
            .ok_or_else(|| BreakerError::UnknownGuard(id.clone()))
    }

    /// Run one call through the gate. See [`CallGate::gate`].
    pub async fn call<T, E, F, Fut, FB, FbFut>(&self, guard: &Arc<Guard>, invoke: F, fallback: FB) -> Result<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.gate.gate(guard, invoke, fallback).await
    }

    pub fn gate(&self) -> &CallGate {
        &self.gate
    }

    pub fn is_open(&self, id: &OperationId) -> bool {
        self.registry.contains(id)
    }

    pub fn trip_state(&self, id: &OperationId) -> Option<TripEntry> {
        self.registry.get(id)
    }

    /// All currently tripped identities.
    pub fn open_guards(&self) -> Vec<(OperationId, TripEntry)> {
        self.registry.tripped()
    }

    /// Close a guard whose replays were exhausted.
    pub fn reset(&self, id: &OperationId) -> BreakerResult<TripEntry> {
        let entry = self.registry.reset(id)?;
        tracing::info!(guard = %id, episode = %entry.episode, "Exhausted guard reset by operator");
        Ok(entry)
    }

    /// Records waiting for their next replay.
    pub fn pending_replays(&self) -> usize {
        self.scheduler.pending()
    }

    /// Stop the dispatcher and drain the replay pool. Trips and counters are
    /// in-memory only and do not survive.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

/// Resolve a `[[guards]]` entry against the `[retry]` defaults.
pub fn guard_policy(guard: &GuardConfig, config: &BreakerConfig) -> GuardPolicy {
    let retry = &config.retry;
    GuardPolicy {
        threshold: guard.threshold,
        window: guard.window_unit.duration(guard.window_size),
        max_retry: guard.max_retry.unwrap_or(retry.max_retry),
        retry_interval: Duration::from_millis(guard.retry_interval_ms.unwrap_or(retry.retry_interval_ms)),
        backoff: retry.backoff(),
        fallback: guard.fallback.clone(),
        alert: guard.alert.clone(),
    }
}
