//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded call:
//!     → gate.rs (registry lookup: open → fallback)
//!     → closed: run the operation, arbiter.rs (tally outcome in window)
//!     → over threshold: registry.rs (trip) + record.rs (capture call)
//!     → scheduler.rs (wait retry interval) → pool.rs (replay on a worker)
//!     → replay ok: registry cleared, real calls resume
//!     → retries exhausted: guard stays open, alert raised
//! ```
//!
//! # Design Decisions
//! - State is per operation identity; guards never share counters
//! - Callers never wait for recovery; they get the fallback immediately
//! - Recovery is probed off the request path by replaying the tripping call
//! - All timing uses Tokio's clock

pub mod arbiter;
pub mod backoff;
pub mod circuit_breaker;
pub mod error;
pub mod gate;
pub mod guard;
pub mod identity;
pub mod pool;
pub mod record;
pub mod registry;
pub mod scheduler;

pub use arbiter::{ArbiterSnapshot, FailureRateArbiter, Outcome};
pub use backoff::{Backoff, BackoffKind};
pub use circuit_breaker::CircuitBreaker;
pub use error::{BreakerError, BreakerResult, PoolError, ReplayError};
pub use gate::CallGate;
pub use guard::{Guard, GuardPolicy};
pub use identity::OperationId;
pub use record::{InvocationRecord, RecordSummary};
pub use registry::{TripEntry, TripRegistry, TripState};
pub use scheduler::{RetryScheduler, SchedulerSettings};
