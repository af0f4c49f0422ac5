//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BreakerConfig (validated, immutable)
//!     → CircuitBreaker::from_config (alert sinks, pool, guards)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a guard's policy never changes for the
//!   lifetime of the breaker
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::BreakerConfig;
pub use schema::GuardConfig;
pub use schema::PoolConfig;
pub use schema::RetryConfig;
