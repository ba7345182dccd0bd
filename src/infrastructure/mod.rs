//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `error`: Unified error type and its HTTP mapping
//! - `postgres`: PostgreSQL connection pool and health checks

pub mod config;
pub mod error;
pub mod postgres;
