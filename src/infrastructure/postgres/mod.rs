//! PostgreSQL persistence module.
//!
//! Provides the fixed-size connection pool and its periodic health checks.

pub mod health;
pub mod pool;

pub use health::HealthChecker;
pub use pool::{mask_dsn, PostgresPool};
