//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → dispatcher exits → replay pool stops accepting
//!             → in-flight replays drain (grace period) → remaining aborted
//! ```
//!
//! # Design Decisions
//! - One coordinator shared by clone; tasks subscribe or poll the latch
//! - Shutdown has a deadline: it never blocks process exit indefinitely

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
