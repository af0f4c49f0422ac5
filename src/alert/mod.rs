//! Alerting subsystem.
//!
//! # Data Flow
//! ```text
//! replay worker: retries exhausted
//!     → AlertRouter::notify(guard's alert name | default)
//!     → AlertSink::notify(&RecordSummary)
//!         - LogAlert: structured error event
//!         - WebhookAlert: fire-and-forget JSON POST
//! ```
//!
//! # Design Decisions
//! - Sinks are selected by name, so config can pick them per guard
//! - `notify` is synchronous and must return quickly; sinks that do I/O
//!   spawn it and bound it with a timeout
//! - Called from a replay worker, never from the dispatcher

pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use crate::observability::metrics;
use crate::resilience::error::{BreakerError, BreakerResult};
use crate::resilience::record::RecordSummary;

pub use webhook::WebhookAlert;

/// Name of the built-in log sink.
pub const LOG_ALERT: &str = "log";

/// Receives one notification per exhausted trip episode.
pub trait AlertSink: Send + Sync {
    fn notify(&self, summary: &RecordSummary);
}

/// Default sink: an `error` level event with the summary as fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlert;

impl AlertSink for LogAlert {
    fn notify(&self, summary: &RecordSummary) {
        tracing::error!(
            guard = %summary.operation,
            episode = %summary.episode,
            retries = summary.retries,
            fallback = ?summary.fallback,
            last_error = ?summary.last_error,
            "Retries exhausted, guard stays open"
        );
    }
}

/// Named alert sinks with a default.
#[derive(Clone)]
pub struct AlertRouter {
    sinks: HashMap<String, Arc<dyn AlertSink>>,
    default: String,
}

impl AlertRouter {
    /// A router holding only the log sink, which is also the default.
    pub fn new() -> Self {
        let mut sinks: HashMap<String, Arc<dyn AlertSink>> = HashMap::new();
        sinks.insert(LOG_ALERT.to_string(), Arc::new(LogAlert));
        Self {
            sinks,
            default: LOG_ALERT.to_string(),
        }
    }

    /// Install (or replace) a sink under `name`.
    pub fn with_sink(mut self, name: impl Into<String>, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.insert(name.into(), sink);
        self
    }

    /// Choose the sink used by guards that don't name one.
    pub fn with_default(mut self, name: impl Into<String>) -> BreakerResult<Self> {
        let name = name.into();
        if !self.sinks.contains_key(&name) {
            return Err(BreakerError::UnknownAlert(name));
        }
        self.default = name;
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// The sink for `name`, or the default one when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Option<&Arc<dyn AlertSink>> {
        self.sinks.get(name.unwrap_or(&self.default))
    }

    /// Deliver `summary` to the sink selected by `name`.
    pub fn notify(&self, name: Option<&str>, summary: &RecordSummary) {
        match self.resolve(name) {
            Some(sink) => {
                metrics::record_alert(summary.operation.as_str());
                sink.notify(summary);
            }
            None => {
                // Guards are checked at registration; only a sink removed
                // afterwards gets here.
                tracing::error!(
                    guard = %summary.operation,
                    alert = ?name,
                    "Alert sink not found, falling back to log"
                );
                LogAlert.notify(summary);
            }
        }
    }
}

impl Default for AlertRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AlertRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.sinks.keys().collect();
        names.sort();
        f.debug_struct("AlertRouter")
            .field("sinks", &names)
            .field("default", &self.default)
            .finish()
    }
}
