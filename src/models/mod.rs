//! Data models for service bootstrap.
//!
//! This module re-exports all model types used throughout the crate.

pub mod pool;
pub mod query;

// Re-export commonly used types
pub use pool::{DEFAULT_MAX_OPEN_CONN, DEFAULT_POOL_NAME, DatabaseType, PoolConfig, PoolMapConfig};
pub use query::{QueryOutput, QueryParam, QueryRows, returns_rows};
