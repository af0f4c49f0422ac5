//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the breaker.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alert::LOG_ALERT;
use crate::resilience::backoff::{Backoff, BackoffKind};
use crate::resilience::scheduler::SchedulerSettings;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BreakerConfig {
    /// Replay pool sizing and shutdown grace.
    pub pool: PoolConfig,

    /// Retry defaults for guards that don't override them.
    pub retry: RetryConfig,

    /// Alert sink selection.
    pub alert: AlertConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Guarded operations.
    pub guards: Vec<GuardConfig>,
}

/// Replay pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent replays. Fixed size; there is no separate core
    /// count.
    pub workers: usize,

    /// Replays that may wait for a worker before hand-offs are rejected.
    pub queue_capacity: usize,

    /// Time in-flight replays get to finish on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl PoolConfig {
    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 96,
            shutdown_grace_secs: 23,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failed replays before the alert is raised.
    pub max_retry: u32,

    /// Delay before a replay in milliseconds.
    pub retry_interval_ms: u64,

    /// Fixed interval or exponential growth.
    pub backoff: BackoffKind,

    /// Cap for exponential backoff in milliseconds.
    pub max_interval_ms: u64,
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        match self.backoff {
            BackoffKind::Fixed => Backoff::fixed(),
            BackoffKind::Exponential => Backoff::exponential(Duration::from_millis(self.max_interval_ms)),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry: 3,
            retry_interval_ms: 5000,
            backoff: BackoffKind::Fixed,
            max_interval_ms: 60_000,
        }
    }
}

/// Alert configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Sink used by guards that don't name one (`log` or `webhook`).
    pub default: String,

    /// Enables the `webhook` sink.
    pub webhook_url: Option<String>,

    /// Webhook request timeout in milliseconds.
    pub webhook_timeout_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            default: LOG_ALERT.to_string(),
            webhook_url: None,
            webhook_timeout_ms: 3000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty (development) or JSON (production) output.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Unit of a guard's window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Millis,
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn duration(self, size: u64) -> Duration {
        match self {
            TimeUnit::Millis => Duration::from_millis(size),
            TimeUnit::Seconds => Duration::from_secs(size),
            TimeUnit::Minutes => Duration::from_secs(size.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(size.saturating_mul(3600)),
        }
    }
}

/// One guarded operation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardConfig {
    /// Operation identity.
    pub name: String,

    /// Highest tolerable failure rate, 0.0 to 1.0.
    pub threshold: f64,

    /// Window size, in `window_unit`s.
    #[serde(default = "default_window_size")]
    pub window_size: u64,

    #[serde(default)]
    pub window_unit: TimeUnit,

    /// Name of the fallback (informational).
    #[serde(default)]
    pub fallback: Option<String>,

    /// Overrides `retry.max_retry`.
    #[serde(default)]
    pub max_retry: Option<u32>,

    /// Overrides `retry.retry_interval_ms`.
    #[serde(default)]
    pub retry_interval_ms: Option<u64>,

    /// Overrides `alert.default`.
    #[serde(default)]
    pub alert: Option<String>,
}

fn default_window_size() -> u64 {
    5
}
