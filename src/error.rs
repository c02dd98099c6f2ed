//! Error types for service bootstrap.
//!
//! This module defines all error types using `thiserror`. Pool-scoped variants
//! carry the configured pool name so a failed bootstrap points at the entry
//! that broke it.

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Config load failed: {path}: {message}")]
    ConfigLoad { path: String, message: String },

    #[error("Failed to open pool '{name}': {message}")]
    ConnectionOpen {
        name: String,
        message: String,
        suggestion: String,
    },

    #[error("Liveness check failed for pool '{name}': {source}")]
    LivenessCheck {
        name: String,
        #[source]
        source: sqlx::Error,
        suggestion: String,
    },

    #[error("Pool not found: {name}")]
    PoolNotFound { name: String },

    #[error("Pool '{name}' is already registered")]
    DuplicatePool { name: String },

    /// Driver error, passed through untouched.
    #[error(transparent)]
    Query(#[from] sqlx::Error),

    #[error("Failed to close pool '{name}': {message}")]
    PoolClose { name: String, message: String },

    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

impl DbError {
    /// Create a config load error for the given path.
    pub fn config_load(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// Create a connection open error with a helpful suggestion.
    pub fn connection_open(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::ConnectionOpen {
            name: name.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a liveness check error wrapping the ping failure.
    pub fn liveness_check(
        name: impl Into<String>,
        source: sqlx::Error,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::LivenessCheck {
            name: name.into(),
            source,
            suggestion: suggestion.into(),
        }
    }

    /// Create a pool not found error.
    pub fn pool_not_found(name: impl Into<String>) -> Self {
        Self::PoolNotFound { name: name.into() }
    }

    pub fn duplicate_pool(name: impl Into<String>) -> Self {
        Self::DuplicatePool { name: name.into() }
    }

    pub fn pool_close(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PoolClose {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    /// Name of the pool this error is about, if any.
    pub fn pool_name(&self) -> Option<&str> {
        match self {
            Self::ConnectionOpen { name, .. }
            | Self::LivenessCheck { name, .. }
            | Self::PoolNotFound { name }
            | Self::DuplicatePool { name }
            | Self::PoolClose { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::ConnectionOpen { suggestion, .. } => Some(suggestion),
            Self::LivenessCheck { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Result type alias for bootstrap and database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection_open("default", "bad url", "Check the URL");
        assert!(err.to_string().contains("Failed to open pool 'default'"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::liveness_check("reports", sqlx::Error::PoolTimedOut, "Is it up?");
        assert_eq!(err.suggestion(), Some("Is it up?"));
        assert!(DbError::pool_not_found("x").suggestion().is_none());
    }

    #[test]
    fn test_pool_name_attached() {
        let err = DbError::liveness_check("reports", sqlx::Error::PoolTimedOut, "");
        assert_eq!(err.pool_name(), Some("reports"));
        assert_eq!(DbError::pool_not_found("missing").pool_name(), Some("missing"));
        assert_eq!(DbError::config_load("a.toml", "x").pool_name(), None);

        let err = DbError::duplicate_pool("default");
        assert_eq!(err.pool_name(), Some("default"));
        assert_eq!(err.to_string(), "Pool 'default' is already registered");
    }

    #[test]
    fn test_query_error_is_transparent() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.to_string(), sqlx::Error::RowNotFound.to_string());
        assert!(matches!(err, DbError::Query(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_config_load_includes_path() {
        let err = DbError::config_load("conf/dev/mysql_map.toml", "missing field");
        let msg = err.to_string();
        assert!(msg.contains("conf/dev/mysql_map.toml"));
        assert!(msg.contains("missing field"));
    }
}
