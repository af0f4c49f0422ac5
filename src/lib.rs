//! Per-operation circuit breaker with background replay.

pub mod alert;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use alert::{AlertRouter, AlertSink};
pub use config::schema::BreakerConfig;
pub use lifecycle::Shutdown;
pub use resilience::{BreakerError, CircuitBreaker, GuardPolicy, OperationId, SchedulerSettings};
