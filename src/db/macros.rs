//! Database dispatch macros for reducing code duplication.
//!
//! `DbPool` wraps a different sqlx pool type per backend, so code that is
//! textually identical for every backend still needs one match arm each.
//! These macros expand that repetition at compile time.

/// Run the same expression against whichever pool a `DbPool` holds.
///
/// # Example
///
/// ```ignore
/// let closed = with_pool!(pool, p => p.is_closed());
/// ```
#[macro_export]
macro_rules! with_pool {
    ($pool:expr, $p:ident => $body:expr) => {
        match $pool {
            $crate::db::pool::DbPool::MySql($p) => $body,
            $crate::db::pool::DbPool::Postgres($p) => $body,
            $crate::db::pool::DbPool::SQLite($p) => $body,
        }
    };
}

pub use with_pool;
