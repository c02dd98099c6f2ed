//! Query-related data models.
//!
//! This module defines bound parameter values and the outcome of an executed
//! statement.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Timestamp without time zone
    Time(NaiveDateTime),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Time(_) => "time",
        }
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDateTime> for QueryParam {
    fn from(v: NaiveDateTime) -> Self {
        Self::Time(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Rows fetched by a statement, in the driver's own row type.
pub enum QueryRows {
    MySql(Vec<MySqlRow>),
    Postgres(Vec<PgRow>),
    SQLite(Vec<SqliteRow>),
}

impl QueryRows {
    pub fn len(&self) -> usize {
        match self {
            Self::MySql(rows) => rows.len(),
            Self::Postgres(rows) => rows.len(),
            Self::SQLite(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for QueryRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self {
            Self::MySql(_) => "MySql",
            Self::Postgres(_) => "Postgres",
            Self::SQLite(_) => "SQLite",
        };
        f.debug_struct("QueryRows")
            .field("backend", &backend)
            .field("rows", &self.len())
            .finish()
    }
}

/// What an executed statement produced.
#[derive(Debug)]
pub enum QueryOutput {
    Rows(QueryRows),
    Affected(u64),
}

impl QueryOutput {
    /// Row count for fetches, affected count for writes.
    pub fn row_count(&self) -> u64 {
        match self {
            Self::Rows(rows) => rows.len() as u64,
            Self::Affected(n) => *n,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Affected(n) => Some(*n),
        }
    }
}

/// Whether a statement is expected to return a result set.
///
/// Looks at the leading keyword (after comments and parentheses) and at any
/// `RETURNING` clause outside string literals, quoted identifiers and
/// comments.
pub fn returns_rows(sql: &str) -> bool {
    const ROW_KEYWORDS: &[&str] = &[
        "SELECT", "SHOW", "WITH", "EXPLAIN", "DESCRIBE", "DESC", "PRAGMA", "VALUES", "TABLE",
    ];

    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix('(') {
            rest = after.trim_start();
        } else {
            break;
        }
    }

    let keyword: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    ROW_KEYWORDS.contains(&keyword.as_str())
        || strip_quoted_and_comments(sql)
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .any(|word| word.eq_ignore_ascii_case("RETURNING"))
}

/// Replace quoted text and comments with a single space each.
fn strip_quoted_and_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                while let Some(next) = chars.next() {
                    if next == '\\' && c != '`' {
                        chars.next();
                    } else if next == c {
                        break;
                    }
                }
                out.push(' ');
            }
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(
            QueryParam::String("hello".to_string()).type_name(),
            "string"
        );
    }

    #[test]
    fn test_query_param_conversions() {
        assert_eq!(QueryParam::from("a"), QueryParam::String("a".to_string()));
        assert_eq!(QueryParam::from(5_i64), QueryParam::Int(5));
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some(true)), QueryParam::Bool(true));
    }

    #[test]
    fn test_query_param_serializes_untagged() {
        let params = vec![QueryParam::from("a"), QueryParam::from(5_i32), QueryParam::Null];
        assert_eq!(serde_json::to_string(&params).unwrap(), r#"["a",5,null]"#);
    }

    #[test]
    fn test_returns_rows() {
        assert!(returns_rows("SELECT 1"));
        assert!(returns_rows("  select * from t"));
        assert!(returns_rows("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(returns_rows("(SELECT 1) UNION (SELECT 2)"));
        assert!(returns_rows("-- comment\nSHOW TABLES"));
        assert!(returns_rows("/* hint */ EXPLAIN SELECT 1"));
        assert!(returns_rows("PRAGMA table_info(t)"));
        assert!(returns_rows("INSERT INTO t (a) VALUES (1) RETURNING id"));
    }

    #[test]
    fn test_write_statements_do_not_return_rows() {
        assert!(!returns_rows("INSERT INTO t (a) VALUES (1)"));
        assert!(!returns_rows("UPDATE t SET a = 1"));
        assert!(!returns_rows("DELETE FROM t"));
        assert!(!returns_rows("CREATE TABLE t (id INTEGER)"));
        assert!(!returns_rows("UPDATE t SET returning_flag = 1"));
    }

    #[test]
    fn test_returning_inside_literals_is_ignored() {
        assert!(!returns_rows("UPDATE t SET note = 'returning'"));
        assert!(!returns_rows("INSERT INTO t (note) VALUES ('it''s returning soon')"));
        assert!(!returns_rows(r"INSERT INTO t (note) VALUES ('a\' returning')"));
        assert!(!returns_rows("UPDATE t SET \"returning\" = 1"));
        assert!(!returns_rows("UPDATE `returning` SET a = 1"));
        assert!(!returns_rows("DELETE FROM t -- returning id"));
        assert!(!returns_rows("DELETE FROM t /* returning id */"));

        assert!(returns_rows("UPDATE t SET note = 'x' RETURNING id"));
        assert!(returns_rows("DELETE FROM t WHERE a = '--' RETURNING *"));
    }

    #[test]
    fn test_query_output_counts() {
        assert_eq!(QueryOutput::Affected(3).row_count(), 3);
        assert_eq!(QueryOutput::Affected(3).rows_affected(), Some(3));
        let rows = QueryOutput::Rows(QueryRows::SQLite(Vec::new()));
        assert_eq!(rows.row_count(), 0);
        assert_eq!(rows.rows_affected(), None);
    }
}
