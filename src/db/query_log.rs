//! Logged query execution.
//!
//! Every statement run through [`QueryLogger::execute_logged`] produces exactly
//! one record carrying the trace, the SQL, its bound values and the elapsed
//! time. Records go to a [`LogSink`]; sink failures never affect the query.

use crate::db::executor;
use crate::db::pool::DbPool;
use crate::db::sql_format::SqlEventRecord;
use crate::error::{DbError, DbResult};
use crate::models::{QueryOutput, QueryParam};
use crate::trace::TraceContext;
use serde::{Serialize, Serializer};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

/// Tag for statements that completed.
pub const SUCCESS_TAG: &str = "_com_mysql_success";

/// Tag for statements that failed and for non-statement ORM events.
pub const FAILURE_TAG: &str = "_com_mysql_failure";

const LOG_TARGET: &str = "sql_log";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sink writer lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryOutcome {
    Success,
    Failure { error: String },
}

/// One executed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLogRecord {
    pub trace_id: String,
    pub span_id: String,
    pub sql: String,
    pub bind: Vec<QueryParam>,
    /// Serialized as seconds with six decimals
    #[serde(serialize_with = "serialize_seconds")]
    pub proc_time: Duration,
    #[serde(flatten)]
    pub outcome: QueryOutcome,
}

impl QueryLogRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == QueryOutcome::Success
    }

    pub fn tag(&self) -> &'static str {
        if self.is_success() { SUCCESS_TAG } else { FAILURE_TAG }
    }

    pub fn proc_time_secs(&self) -> String {
        format!("{:.6}", self.proc_time.as_secs_f64())
    }
}

fn serialize_seconds<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:.6}", d.as_secs_f64()))
}

/// Anything a sink may receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogRecord {
    Query(QueryLogRecord),
    SqlEvent(SqlEventRecord),
}

impl LogRecord {
    pub fn tag(&self) -> &'static str {
        match self {
            LogRecord::Query(r) => r.tag(),
            LogRecord::SqlEvent(r) => r.tag(),
        }
    }

    pub fn trace_id(&self) -> &str {
        match self {
            LogRecord::Query(r) => &r.trace_id,
            LogRecord::SqlEvent(r) => &r.trace_id,
        }
    }
}

/// Destination for query log records.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError>;
}

/// Emits records as `tracing` events under the `sql_log` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let tag = record.tag();
        match record {
            LogRecord::Query(r) => {
                let bind = serde_json::to_string(&r.bind)?;
                match &r.outcome {
                    QueryOutcome::Success => info!(
                        target: LOG_TARGET,
                        dltag = tag,
                        trace_id = %r.trace_id,
                        span_id = %r.span_id,
                        sql = %r.sql,
                        bind = %bind,
                        proc_time = %r.proc_time_secs(),
                        "query"
                    ),
                    QueryOutcome::Failure { error } => error!(
                        target: LOG_TARGET,
                        dltag = tag,
                        trace_id = %r.trace_id,
                        span_id = %r.span_id,
                        sql = %r.sql,
                        bind = %bind,
                        proc_time = %r.proc_time_secs(),
                        error = %error,
                        "query failed"
                    ),
                }
            }
            LogRecord::SqlEvent(r) => {
                let ext = r.ext.as_ref().map(|v| v.to_string());
                info!(
                    target: LOG_TARGET,
                    dltag = tag,
                    trace_id = %r.trace_id,
                    span_id = %r.span_id,
                    level = %r.level,
                    source = %r.source,
                    current_time = %r.current_time,
                    proc_time = r.proc_time.as_deref(),
                    sql = r.sql.as_deref(),
                    affected_row = r.affected_row.as_deref(),
                    ext = ext.as_deref(),
                    "sql event"
                );
            }
        }
        Ok(())
    }
}

/// Writes one JSON object per line, with the tag under `dltag`.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer.into_inner().map_err(|_| SinkError::Poisoned)
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut value = serde_json::to_value(record)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert("dltag".to_string(), record.tag().into());
        }
        let line = serde_json::to_string(&value)?;

        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Runs statements and logs each one.
#[derive(Clone)]
pub struct QueryLogger {
    sink: Arc<dyn LogSink>,
}

impl QueryLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Execute `sql` on `pool` and emit one record for it.
    ///
    /// The driver error, if any, is returned unchanged as [`DbError::Query`]
    /// after the failure record is emitted. No timeout is added here; the
    /// pool's acquire timeout still applies.
    pub async fn execute_logged(
        &self,
        pool: &DbPool,
        trace: &TraceContext,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryOutput> {
        let start = Instant::now();
        let result = executor::execute(pool, sql, params).await;
        let proc_time = start.elapsed();

        let outcome = match &result {
            Ok(_) => QueryOutcome::Success,
            Err(e) => QueryOutcome::Failure {
                error: e.to_string(),
            },
        };
        let record = LogRecord::Query(QueryLogRecord {
            trace_id: trace.trace_id.clone(),
            span_id: trace.span_id.clone(),
            sql: sql.to_string(),
            bind: params.to_vec(),
            proc_time,
            outcome,
        });
        if let Err(e) = self.sink.emit(&record) {
            debug!(error = %e, "Query log sink failed");
        }

        result.map_err(DbError::Query)
    }
}

impl Default for QueryLogger {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl std::fmt::Debug for QueryLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryLogger").finish_non_exhaustive()
    }
}
