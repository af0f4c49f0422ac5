//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gate, scheduler, pool, registry produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Every event carries the guard name as a field
//! - Metrics are cheap and silently dropped when no exporter is installed

pub mod logging;
pub mod metrics;
