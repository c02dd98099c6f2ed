//! Logging setup driven by the `[log]` section of `base.toml`.
//!
//! Builds one `tracing_subscriber` registry out of independent layers:
//! - console output (plain, colored or JSON)
//! - a file receiving every enabled level
//! - a second file receiving warnings and errors only
//!
//! File output goes through `tracing_appender` non-blocking writers. Their
//! flush guards live in the returned [`LogGuard`]; drop it at shutdown.

use crate::config::LogConfig;
use crate::error::{DbError, DbResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps background log writers alive. Dropping it flushes them.
#[derive(Default)]
pub struct LogGuard {
    guards: Vec<WorkerGuard>,
}

impl LogGuard {
    /// Number of file writers held open.
    pub fn writer_count(&self) -> usize {
        self.guards.len()
    }
}

impl std::fmt::Debug for LogGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGuard")
            .field("writers", &self.guards.len())
            .finish()
    }
}

/// Level filter: `RUST_LOG` wins, then the configured level.
///
/// `fatal` and `critical` from older configs map to `error`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match level.trim().to_ascii_lowercase().as_str() {
            "" => "trace".to_string(),
            "fatal" | "critical" => "error".to_string(),
            "warning" => "warn".to_string(),
            other => other.to_string(),
        };
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

fn file_writer(
    path: &str,
    guards: &mut Vec<WorkerGuard>,
) -> DbResult<tracing_appender::non_blocking::NonBlocking> {
    let path = Path::new(path);
    let file_name = path
        .file_name()
        .ok_or_else(|| DbError::logging(format!("log path has no file name: {}", path.display())))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| DbError::logging(format!("create {} failed: {e}", dir.display())))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .map_err(|e| DbError::logging(format!("open {} failed: {e}", path.display())))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);
    Ok(writer)
}

/// Assemble the configured layers without installing them.
fn build_layers(config: &LogConfig) -> DbResult<(Vec<BoxedLayer>, LogGuard)> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guards = Vec::new();

    let console = &config.console_writer;
    if console.on {
        let layer: BoxedLayer = if console.json {
            fmt::layer()
                .json()
                .with_filter(build_filter(&config.level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(console.color)
                .with_filter(build_filter(&config.level))
                .boxed()
        };
        layers.push(layer);
    }

    let files = &config.file_writer;
    if files.on {
        if !files.log_path.is_empty() {
            let writer = file_writer(&files.log_path, &mut guards)?;
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(build_filter(&config.level))
                    .boxed(),
            );
        }
        if !files.wf_log_path.is_empty() {
            let writer = file_writer(&files.wf_log_path, &mut guards)?;
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(LevelFilter::WARN)
                    .boxed(),
            );
        }
    }

    Ok((layers, LogGuard { guards }))
}

/// Install the global subscriber described by `config`.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LogConfig) -> DbResult<LogGuard> {
    let (layers, guard) = build_layers(config)?;
    let layer_count = layers.len();

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| DbError::logging(e.to_string()))?;

    tracing::info!(
        level = %config.level,
        layers = layer_count,
        "Logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsoleWriterConf, FileWriterConf};

    #[test]
    fn test_no_writers_builds_no_layers() {
        let (layers, guard) = build_layers(&LogConfig::default()).unwrap();
        assert!(layers.is_empty());
        assert_eq!(guard.writer_count(), 0);
    }

    #[test]
    fn test_file_writers_create_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            level: "info".to_string(),
            file_writer: FileWriterConf {
                on: true,
                log_path: dir.path().join("logs/app.log").display().to_string(),
                wf_log_path: dir.path().join("logs/app.wf.log").display().to_string(),
                ..FileWriterConf::default()
            },
            console_writer: ConsoleWriterConf {
                on: true,
                ..ConsoleWriterConf::default()
            },
        };

        let (layers, guard) = build_layers(&config).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(guard.writer_count(), 2);
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_file_writer_off_ignores_paths() {
        let config = LogConfig {
            file_writer: FileWriterConf {
                on: false,
                log_path: "/nonexistent/should/not/be/created.log".to_string(),
                ..FileWriterConf::default()
            },
            ..LogConfig::default()
        };
        let (layers, _guard) = build_layers(&config).unwrap();
        assert!(layers.is_empty());
    }

    #[test]
    fn test_level_aliases() {
        // Does not panic on legacy names.
        for level in ["fatal", "warning", "trace", "", "nonsense!!"] {
            let _ = build_filter(level);
        }
    }
}
