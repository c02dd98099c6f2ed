//! Service bootstrap library.
//!
//! Loads an environment's configuration directory, sets up logging, opens
//! named database pools and mints trace identifiers. Queries run through
//! [`db::QueryLogger`] are logged with their trace, SQL and timing.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod trace;

pub use bootstrap::Bootstrap;
pub use config::Config;
pub use db::{DbPool, PoolManager, QueryLogger};
pub use error::{DbError, DbResult};
pub use trace::{IdGenerator, TraceContext};
