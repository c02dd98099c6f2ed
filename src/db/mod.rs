//! Database layer.
//!
//! - Connection pool management
//! - Statement execution and parameter binding
//! - Query logging, including ORM-style SQL event formatting
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod executor;
pub(crate) mod params;
pub mod pool;
pub mod query_log;
pub mod sql_format;

pub use executor::execute;
pub use pool::{DbPool, PoolManager};
pub use query_log::{
    FAILURE_TAG, LogRecord, LogSink, QueryLogRecord, QueryLogger, QueryOutcome, SUCCESS_TAG,
    SinkError, TracingSink, WriterSink,
};
pub use sql_format::{RenderValue, SqlEventLogger, SqlEventRecord, SqlLogEvent, render_sql};
