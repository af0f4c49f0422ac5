//! Breaker error types.

use thiserror::Error;

use crate::resilience::identity::OperationId;

/// Errors surfaced by the breaker's own API (never by guarded calls).
#[derive(Debug, Error)]
pub enum BreakerError {
    /// The identity is already registered with a different policy.
    #[error("guard {0} is already registered with a different policy")]
    ConflictingRegistration(OperationId),

    /// The policy failed a sanity check.
    #[error("invalid policy for guard {id}: {reason}")]
    InvalidPolicy { id: OperationId, reason: String },

    /// No guard is registered under this identity.
    #[error("unknown guard: {0}")]
    UnknownGuard(OperationId),

    /// The policy names an alert sink that was never installed.
    #[error("unknown alert sink: {0}")]
    UnknownAlert(String),

    /// An alert sink could not be built from its settings.
    #[error("alert sink {name} misconfigured: {reason}")]
    AlertSetup { name: String, reason: String },

    /// A replay for this trip is still owned by the scheduler.
    #[error("guard {0} still has a replay scheduled")]
    ReplayPending(OperationId),

    /// The identity is not tripped.
    #[error("guard {0} is not tripped")]
    NotTripped(OperationId),
}

/// Errors handing a replay to the worker pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The bounded queue is full; replay volume exceeds capacity.
    #[error("replay pool saturated (queue capacity {capacity})")]
    Saturated { capacity: usize },

    /// The pool no longer accepts work.
    #[error("replay pool is shut down")]
    ShutDown,
}

/// Why a replay did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("replay failed: {0}")]
    Failed(String),

    #[error("replay panicked: {0}")]
    Panicked(String),
}

/// Result type for breaker operations.
pub type BreakerResult<T> = Result<T, BreakerError>;
