//! ORM-style SQL event formatting.
//!
//! Query-builder layers report each statement as a [`SqlLogEvent`]. Statements
//! are logged with their bound values substituted into the placeholders so
//! the record reads as runnable SQL:
//!
//! ```ignore
//! let event = SqlLogEvent::Sql {
//!     source: "orders.rs:42".into(),
//!     duration,
//!     query: "SELECT * FROM t WHERE x=? AND y=?",
//!     values: &[&"a", &5],
//!     affected_rows: None,
//! };
//! logger.print(event); // sql = SELECT * FROM t WHERE x='a' AND y='5'
//! ```

use crate::db::query_log::{FAILURE_TAG, LogRecord, LogSink, SUCCESS_TAG, TracingSink};
use crate::models::QueryParam;
use crate::trace::{IdGenerator, TraceContext};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;
use unicode_general_category::{GeneralCategory, get_general_category};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static DOLLAR_PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+)").expect("valid regex"));

/// A value that can be shown inside a logged SQL statement.
pub trait RenderValue {
    /// Text to place between single quotes, or `None` for `NULL`.
    fn render_value(&self) -> Option<String>;
}

macro_rules! render_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RenderValue for $ty {
                fn render_value(&self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )*
    };
}

render_display!(
    str, String, char, bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32,
    f64,
);

impl<T: RenderValue + ?Sized> RenderValue for &T {
    fn render_value(&self) -> Option<String> {
        (**self).render_value()
    }
}

impl<T: RenderValue> RenderValue for Option<T> {
    fn render_value(&self) -> Option<String> {
        self.as_ref().and_then(RenderValue::render_value)
    }
}

impl RenderValue for NaiveDateTime {
    fn render_value(&self) -> Option<String> {
        Some(self.format(TIME_FORMAT).to_string())
    }
}

impl<Tz: TimeZone> RenderValue for DateTime<Tz> {
    fn render_value(&self) -> Option<String> {
        self.naive_local().render_value()
    }
}

impl RenderValue for NaiveDate {
    fn render_value(&self) -> Option<String> {
        Some(self.format("%Y-%m-%d").to_string())
    }
}

impl RenderValue for [u8] {
    fn render_value(&self) -> Option<String> {
        match std::str::from_utf8(self) {
            Ok(text) if text.chars().all(is_printable) => Some(text.to_string()),
            _ => Some("<binary>".to_string()),
        }
    }
}

impl RenderValue for Vec<u8> {
    fn render_value(&self) -> Option<String> {
        self.as_slice().render_value()
    }
}

impl RenderValue for serde_json::Value {
    fn render_value(&self) -> Option<String> {
        match self {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl<T: Serialize> RenderValue for sqlx::types::Json<T> {
    fn render_value(&self) -> Option<String> {
        serde_json::to_value(&self.0).ok()?.render_value()
    }
}

impl RenderValue for QueryParam {
    fn render_value(&self) -> Option<String> {
        match self {
            QueryParam::Null => None,
            QueryParam::Bool(v) => v.render_value(),
            QueryParam::Int(v) => v.render_value(),
            QueryParam::Float(v) => v.render_value(),
            QueryParam::String(v) => v.render_value(),
            QueryParam::Bytes(v) => v.render_value(),
            QueryParam::Time(v) => v.render_value(),
        }
    }
}

// Letters, marks, numbers, punctuation, symbols and the ASCII space.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::PrivateUse
            | GeneralCategory::Surrogate
            | GeneralCategory::Unassigned
            | GeneralCategory::SpaceSeparator
            | GeneralCategory::LineSeparator
            | GeneralCategory::ParagraphSeparator
    )
}

fn literal(value: &dyn RenderValue) -> String {
    match value.render_value() {
        Some(text) => format!("'{}'", text),
        None => "NULL".to_string(),
    }
}

/// Substitute bound values into a statement's placeholders.
///
/// `$n` placeholders take precedence: when any is present, each `$n` becomes
/// the n-th value and indexes without a value are left as written. Otherwise
/// each `?` takes the next value in order. Placeholders beyond the values
/// stay as written; values beyond the placeholders are ignored.
pub fn render_sql(query: &str, values: &[&dyn RenderValue]) -> String {
    let literals: Vec<String> = values.iter().map(|v| literal(*v)).collect();

    if DOLLAR_PLACEHOLDER_REGEX.is_match(query) {
        return DOLLAR_PLACEHOLDER_REGEX
            .replace_all(query, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| literals.get(i))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
    }

    let mut rendered = String::with_capacity(query.len());
    let mut next = literals.iter().peekable();
    for c in query.chars() {
        match next.next_if(|_| c == '?') {
            Some(lit) => rendered.push_str(lit),
            None => rendered.push(c),
        }
    }
    rendered
}

/// One event reported by a query builder.
#[derive(Clone, Copy)]
pub enum SqlLogEvent<'a> {
    /// A statement was executed.
    Sql {
        source: &'a str,
        duration: Duration,
        query: &'a str,
        values: &'a [&'a dyn RenderValue],
        affected_rows: Option<u64>,
    },
    /// Anything else the builder reports (errors, notices).
    Other {
        level: &'a str,
        source: &'a str,
        payload: &'a serde_json::Value,
    },
}

impl std::fmt::Debug for SqlLogEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlLogEvent::Sql {
                source,
                duration,
                query,
                values,
                affected_rows,
            } => f
                .debug_struct("Sql")
                .field("source", source)
                .field("duration", duration)
                .field("query", query)
                .field("values", &values.len())
                .field("affected_rows", affected_rows)
                .finish(),
            SqlLogEvent::Other {
                level,
                source,
                payload,
            } => f
                .debug_struct("Other")
                .field("level", level)
                .field("source", source)
                .field("payload", payload)
                .finish(),
        }
    }
}

/// A formatted ORM event, ready for a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlEventRecord {
    pub trace_id: String,
    pub span_id: String,
    pub level: String,
    pub source: String,
    pub current_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proc_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_row: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<serde_json::Value>,
}

impl SqlEventRecord {
    /// Format `event` as observed at `now`.
    pub fn from_event(trace: &TraceContext, event: &SqlLogEvent<'_>, now: NaiveDateTime) -> Self {
        let current_time = now.format(TIME_FORMAT).to_string();
        match *event {
            SqlLogEvent::Sql {
                source,
                duration,
                query,
                values,
                affected_rows,
            } => Self {
                trace_id: trace.trace_id.clone(),
                span_id: trace.span_id.clone(),
                level: "sql".to_string(),
                source: source.to_string(),
                current_time,
                proc_time: Some(format!("{:.6}s", duration.as_secs_f64())),
                sql: Some(render_sql(query, values)),
                affected_row: affected_rows.map(|n| n.to_string()),
                ext: None,
            },
            SqlLogEvent::Other {
                level,
                source,
                payload,
            } => Self {
                trace_id: trace.trace_id.clone(),
                span_id: trace.span_id.clone(),
                level: level.to_string(),
                source: source.to_string(),
                current_time,
                proc_time: None,
                sql: None,
                affected_row: None,
                ext: Some(payload.clone()),
            },
        }
    }

    pub fn is_sql(&self) -> bool {
        self.sql.is_some()
    }

    /// Statements go under the success tag, everything else under failure.
    pub fn tag(&self) -> &'static str {
        if self.is_sql() { SUCCESS_TAG } else { FAILURE_TAG }
    }
}

/// Logger handed to a query builder.
#[derive(Clone)]
pub struct SqlEventLogger {
    trace: TraceContext,
    ids: IdGenerator,
    sink: Arc<dyn LogSink>,
    time_zone: Option<Tz>,
}

impl SqlEventLogger {
    pub fn new(trace: TraceContext, ids: IdGenerator, sink: Arc<dyn LogSink>) -> Self {
        Self {
            trace,
            ids,
            sink,
            time_zone: None,
        }
    }

    /// Stamp records with wall-clock time in `tz` instead of the host zone.
    pub fn with_time_zone(mut self, tz: Tz) -> Self {
        self.time_zone = Some(tz);
        self
    }

    /// Log through `tracing`.
    pub fn with_tracing(trace: TraceContext, ids: IdGenerator) -> Self {
        Self::new(trace, ids, Arc::new(TracingSink))
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Log under the logger's own trace.
    pub fn print(&self, event: SqlLogEvent<'_>) {
        self.emit(&self.trace, &event);
    }

    /// Log under the caller's trace, or a fresh one when there is none.
    pub fn print_in(&self, trace: Option<&TraceContext>, event: SqlLogEvent<'_>) {
        match trace {
            Some(trace) => self.emit(trace, &event),
            None => {
                let fresh = self.ids.new_trace();
                self.emit(&fresh, &event);
            }
        }
    }

    fn emit(&self, trace: &TraceContext, event: &SqlLogEvent<'_>) {
        let now = match self.time_zone {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        };
        let record = SqlEventRecord::from_event(trace, event, now);
        if let Err(e) = self.sink.emit(&LogRecord::SqlEvent(record)) {
            debug!(error = %e, "SQL event sink failed");
        }
    }
}

impl std::fmt::Debug for SqlEventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlEventLogger")
            .field("trace", &self.trace)
            .field("local_ip", &self.ids.local_ip())
            .field("time_zone", &self.time_zone)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::query_log::SinkError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<LogRecord>>);

    impl LogSink for Capture {
        fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn trace() -> TraceContext {
        TraceContext {
            trace_id: "t".repeat(32),
            span_id: "s".repeat(16),
        }
    }

    fn at_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 0, 5)
            .unwrap()
    }

    #[test]
    fn test_question_mark_placeholders() {
        let sql = render_sql("SELECT * FROM t WHERE x=? AND y=?", &[&"a", &5]);
        assert_eq!(sql, "SELECT * FROM t WHERE x='a' AND y='5'");
    }

    #[test]
    fn test_dollar_placeholders() {
        let sql = render_sql("SELECT * FROM t WHERE x=$1 AND y=$2", &[&"a", &5]);
        assert_eq!(sql, "SELECT * FROM t WHERE x='a' AND y='5'");
    }

    #[test]
    fn test_dollar_placeholders_single_pass() {
        // $10 is not $1 followed by 0, and a value containing $2 is not rescanned
        let values: Vec<&dyn RenderValue> = vec![&"$2", &"b"];
        let sql = render_sql("VALUES ($1, $2, $10)", &values);
        assert_eq!(sql, "VALUES ('$2', 'b', $10)");
    }

    #[test]
    fn test_placeholder_count_mismatch() {
        assert_eq!(render_sql("x=? AND y=?", &[&1]), "x='1' AND y=?");
        assert_eq!(render_sql("x=?", &[&1, &2, &3]), "x='1'");
        assert_eq!(render_sql("SELECT 1", &[]), "SELECT 1");
    }

    #[test]
    fn test_null_and_option() {
        let missing: Option<i32> = None;
        let present = Some("v");
        let sql = render_sql("a=? b=? c=?", &[&missing, &present, &QueryParam::Null]);
        assert_eq!(sql, "a=NULL b='v' c=NULL");
    }

    #[test]
    fn test_time_rendering() {
        let sql = render_sql("t=?", &[&at_noon()]);
        assert_eq!(sql, "t='2024-03-09 12:00:05'");

        let utc = at_noon().and_utc();
        assert_eq!(render_sql("t=?", &[&utc]), "t='2024-03-09 12:00:05'");
    }

    #[test]
    fn test_bytes_rendering() {
        let text = b"hello".to_vec();
        let binary = vec![0xff_u8, 0x00, 0x10];
        let control = b"a\tb".to_vec();
        let sql = render_sql("? ? ?", &[&text, &binary, &control]);
        assert_eq!(sql, "'hello' '<binary>' '<binary>'");
    }

    #[test]
    fn test_bytes_with_invisible_characters() {
        let zero_width = "a\u{200B}b".as_bytes().to_vec();
        let private_use = "x\u{E000}".as_bytes().to_vec();
        let no_break = "a\u{00A0}b".as_bytes().to_vec();
        let sql = render_sql("? ? ?", &[&zero_width, &private_use, &no_break]);
        assert_eq!(sql, "'<binary>' '<binary>' '<binary>'");

        let accented = "naïve 中文 €5".as_bytes().to_vec();
        assert_eq!(render_sql("?", &[&accented]), "'naïve 中文 €5'");
    }

    #[test]
    fn test_json_rendering() {
        let json = sqlx::types::Json(serde_json::json!({"k": 1}));
        let none = sqlx::types::Json(Option::<i32>::None);
        assert_eq!(render_sql("? ?", &[&json, &none]), r#"'{"k":1}' NULL"#);
    }

    #[test]
    fn test_sql_event_record() {
        let event = SqlLogEvent::Sql {
            source: "orders.rs:42",
            duration: Duration::from_micros(1500),
            query: "UPDATE t SET x=? WHERE id=?",
            values: &[&"a", &7],
            affected_rows: Some(3),
        };
        let record = SqlEventRecord::from_event(&trace(), &event, at_noon());
        assert_eq!(record.level, "sql");
        assert_eq!(record.current_time, "2024-03-09 12:00:05");
        assert_eq!(record.proc_time.as_deref(), Some("0.001500s"));
        assert_eq!(record.sql.as_deref(), Some("UPDATE t SET x='a' WHERE id='7'"));
        assert_eq!(record.affected_row.as_deref(), Some("3"));
        assert_eq!(record.tag(), SUCCESS_TAG);
    }

    #[test]
    fn test_other_event_record() {
        let payload = serde_json::json!(["error", "connection reset"]);
        let event = SqlLogEvent::Other {
            level: "log",
            source: "orders.rs:50",
            payload: &payload,
        };
        let record = SqlEventRecord::from_event(&trace(), &event, at_noon());
        assert_eq!(record.level, "log");
        assert_eq!(record.ext.as_ref(), Some(&payload));
        assert!(record.sql.is_none());
        assert_eq!(record.tag(), FAILURE_TAG);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("sql").is_none());
        assert!(json.get("proc_time").is_none());
    }

    #[test]
    fn test_print_uses_logger_trace() {
        let sink = Arc::new(Capture::default());
        let logger = SqlEventLogger::new(trace(), IdGenerator::new("10.0.0.1"), sink.clone());
        logger.print(SqlLogEvent::Sql {
            source: "a.rs:1",
            duration: Duration::ZERO,
            query: "SELECT 1",
            values: &[],
            affected_rows: None,
        });

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            LogRecord::SqlEvent(r) => assert_eq!(r.trace_id, trace().trace_id),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_time_zone_stamps_records() {
        let tz = chrono_tz::Pacific::Kiritimati;
        let sink = Arc::new(Capture::default());
        let logger = SqlEventLogger::new(trace(), IdGenerator::new("10.0.0.1"), sink.clone())
            .with_time_zone(tz);
        logger.print(SqlLogEvent::Sql {
            source: "a.rs:3",
            duration: Duration::ZERO,
            query: "SELECT 1",
            values: &[],
            affected_rows: None,
        });
        let expected = Utc::now().with_timezone(&tz).naive_local();

        let records = sink.0.lock().unwrap();
        let stamped = match &records[0] {
            LogRecord::SqlEvent(r) => {
                NaiveDateTime::parse_from_str(&r.current_time, TIME_FORMAT).unwrap()
            }
            other => panic!("unexpected record {other:?}"),
        };
        assert!((expected - stamped).num_seconds().abs() <= 5);
    }

    #[test]
    fn test_print_in_falls_back_to_fresh_trace() {
        let sink = Arc::new(Capture::default());
        let logger = SqlEventLogger::new(trace(), IdGenerator::new("10.0.0.1"), sink.clone());
        let payload = serde_json::Value::Null;
        let event = SqlLogEvent::Other {
            level: "error",
            source: "a.rs:2",
            payload: &payload,
        };
        let caller = TraceContext {
            trace_id: "c".repeat(32),
            span_id: "d".repeat(16),
        };
        logger.print_in(Some(&caller), event);
        logger.print_in(None, event);

        let records = sink.0.lock().unwrap();
        let ids: Vec<&str> = records
            .iter()
            .map(|r| match r {
                LogRecord::SqlEvent(r) => r.trace_id.as_str(),
                LogRecord::Query(r) => r.trace_id.as_str(),
            })
            .collect();
        assert_eq!(ids[0], caller.trace_id);
        assert_ne!(ids[1], caller.trace_id);
        assert_ne!(ids[1], trace().trace_id);
        assert!(ids[1].starts_with("0a000001"));
    }
}
