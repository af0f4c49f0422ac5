//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (threshold in [0, 1], non-zero windows and pools)
//! - Check references (alert names, unique guard names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BreakerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::alert::webhook::WEBHOOK_ALERT;
use crate::alert::LOG_ALERT;
use crate::config::schema::BreakerConfig;

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("pool.workers must be at least 1")]
    NoWorkers,

    #[error("pool.queue_capacity must be at least 1")]
    NoQueueCapacity,

    #[error("retry.max_retry must be at least 1")]
    NoRetries,

    #[error("retry.retry_interval_ms must be non-zero")]
    ZeroRetryInterval,

    #[error("alert.webhook_url is not a valid URL: {0}")]
    InvalidWebhookUrl(String),

    #[error("alert sink '{0}' is not available")]
    UnknownAlert(String),

    #[error("observability.metrics_address is not a socket address: {0}")]
    InvalidMetricsAddress(String),

    #[error("guard name must not be empty")]
    EmptyGuardName,

    #[error("guard '{0}' is defined more than once")]
    DuplicateGuard(String),

    #[error("guard '{name}': threshold {threshold} is outside [0, 1]")]
    ThresholdOutOfRange { name: String, threshold: f64 },

    #[error("guard '{0}': window_size must be non-zero")]
    ZeroWindow(String),

    #[error("guard '{0}': max_retry must be at least 1")]
    GuardNoRetries(String),

    #[error("guard '{0}': retry_interval_ms must be non-zero")]
    GuardZeroRetryInterval(String),
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &BreakerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.pool.workers == 0 {
        errors.push(ValidationError::NoWorkers);
    }
    if config.pool.queue_capacity == 0 {
        errors.push(ValidationError::NoQueueCapacity);
    }
    if config.retry.max_retry == 0 {
        errors.push(ValidationError::NoRetries);
    }
    if config.retry.retry_interval_ms == 0 {
        errors.push(ValidationError::ZeroRetryInterval);
    }

    let mut sinks: HashSet<&str> = HashSet::from([LOG_ALERT]);
    if let Some(url) = &config.alert.webhook_url {
        match Url::parse(url) {
            Ok(_) => {
                sinks.insert(WEBHOOK_ALERT);
            }
            Err(e) => errors.push(ValidationError::InvalidWebhookUrl(e.to_string())),
        }
    }
    if !sinks.contains(config.alert.default.as_str()) {
        errors.push(ValidationError::UnknownAlert(config.alert.default.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for guard in &config.guards {
        let name = &guard.name;
        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyGuardName);
        } else if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateGuard(name.clone()));
        }
        if !(0.0..=1.0).contains(&guard.threshold) {
            errors.push(ValidationError::ThresholdOutOfRange {
                name: name.clone(),
                threshold: guard.threshold,
            });
        }
        if guard.window_size == 0 {
            errors.push(ValidationError::ZeroWindow(name.clone()));
        }
        if guard.max_retry == Some(0) {
            errors.push(ValidationError::GuardNoRetries(name.clone()));
        }
        if guard.retry_interval_ms == Some(0) {
            errors.push(ValidationError::GuardZeroRetryInterval(name.clone()));
        }
        if let Some(alert) = &guard.alert {
            if !sinks.contains(alert.as_str()) {
                errors.push(ValidationError::UnknownAlert(alert.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
