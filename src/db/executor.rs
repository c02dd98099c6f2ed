//! Statement execution against a `DbPool`.
//!
//! Statements that return rows are fetched in full; everything else reports
//! its affected-row count. When there are no parameters the SQL goes out
//! unprepared, since some statements (e.g. `CREATE PROCEDURE` on MySQL) cannot
//! be prepared.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::pool::DbPool;
use crate::models::{QueryOutput, QueryParam, QueryRows, returns_rows};

// Each backend gets the same body; only the binder and row wrapper differ.
macro_rules! run_on {
    ($pool:expr, $sql:expr, $params:expr, $fetch:expr, $bind:path, $rows:path) => {{
        if $params.is_empty() {
            use sqlx::Executor;
            if $fetch {
                $pool
                    .fetch_all($sql)
                    .await
                    .map(|rows| QueryOutput::Rows($rows(rows)))
            } else {
                $pool
                    .execute($sql)
                    .await
                    .map(|r| QueryOutput::Affected(r.rows_affected()))
            }
        } else {
            let mut query = sqlx::query($sql);
            for param in $params {
                query = $bind(query, param);
            }
            if $fetch {
                query
                    .fetch_all($pool)
                    .await
                    .map(|rows| QueryOutput::Rows($rows(rows)))
            } else {
                query
                    .execute($pool)
                    .await
                    .map(|r| QueryOutput::Affected(r.rows_affected()))
            }
        }
    }};
}

/// Execute one statement. Errors are the driver's own.
pub async fn execute(
    pool: &DbPool,
    sql: &str,
    params: &[QueryParam],
) -> Result<QueryOutput, sqlx::Error> {
    let fetch = returns_rows(sql);
    match pool {
        DbPool::MySql(p) => run_on!(p, sql, params, fetch, bind_mysql_param, QueryRows::MySql),
        DbPool::Postgres(p) => {
            run_on!(p, sql, params, fetch, bind_postgres_param, QueryRows::Postgres)
        }
        DbPool::SQLite(p) => run_on!(p, sql, params, fetch, bind_sqlite_param, QueryRows::SQLite),
    }
}
