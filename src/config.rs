//! Configuration handling for service bootstrap.
//!
//! Configuration lives in an environment directory such as `./conf/dev/`, one
//! TOML file per concern (`base.toml`, `mysql_map.toml`, `redis_map.toml`).
//! This module resolves that directory, loads typed configs out of it, and
//! exposes a dotted-key view over every file for ad-hoc lookups. The command
//! line only chooses the directory and the modules to initialize.

use crate::error::{DbError, DbResult};
use chrono_tz::Tz;
use clap::{Parser, ValueEnum};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DEBUG_MODE: &str = "debug";
pub const DEFAULT_TIME_LOCATION: &str = "Asia/Chongqing";
pub const DEFAULT_LOG_LEVEL: &str = "trace";

// Pool lifecycle defaults
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 5;

/// Config file stems loaded by the bootstrap modules.
pub const BASE_CONF_FILE: &str = "base";
pub const REDIS_CONF_FILE: &str = "redis_map";
pub const MYSQL_CONF_FILE: &str = "mysql_map";

/// Read a TOML file and deserialize it.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> DbResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DbError::config_load(path, format!("read failed: {e}")))?;
    toml::from_str(&content).map_err(|e| DbError::config_load(path, format!("parse failed: {e}")))
}

/// Resolved configuration directory and environment name.
///
/// `./conf/dev/` and `./conf/dev/base.toml` both resolve to directory
/// `./conf/dev` and environment `dev`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfPaths {
    pub dir: PathBuf,
    pub env: String,
}

impl ConfPaths {
    pub fn parse(conf: &str) -> DbResult<Self> {
        if conf.trim().is_empty() {
            return Err(DbError::config_load(conf, "config path is empty"));
        }

        let path = Path::new(conf);
        let dir = if conf.ends_with('/') || conf.ends_with(std::path::MAIN_SEPARATOR) {
            path.to_path_buf()
        } else if path.extension().is_some() {
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            path.to_path_buf()
        };

        let env = dir
            .components()
            .next_back()
            .and_then(|c| c.as_os_str().to_str())
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .map(String::from)
            .ok_or_else(|| {
                DbError::config_load(conf, "config path must name an environment directory")
            })?;

        Ok(Self { dir, env })
    }

    /// Path of `<dir>/<name>.toml`.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.toml"))
    }
}

/// Every TOML file of a config directory, keyed by file stem.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    files: BTreeMap<String, toml::Value>,
}

impl ConfigStore {
    /// Load every `*.toml` file directly under `dir`.
    pub fn load_dir(dir: &Path) -> DbResult<Self> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| DbError::config_load(dir, format!("read dir failed: {e}")))?;

        let mut files = BTreeMap::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DbError::config_load(dir, format!("read dir failed: {e}")))?
                .path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let value: toml::Value = load_toml(&path)?;
            files.insert(stem.to_string(), value);
        }
        Ok(Self { files })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: toml::Value) {
        self.files.insert(name.into(), value);
    }

    /// File stems that were loaded.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Look up `file.section.key`. The first segment selects the file.
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        let mut parts = key.split('.');
        let file = parts.next()?;
        let mut value = self.files.get(file)?;
        let mut depth = 0;
        for part in parts {
            value = value.get(part)?;
            depth += 1;
        }
        (depth > 0).then_some(value)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            toml::Value::Datetime(d) => Some(d.to_string()),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            toml::Value::Integer(i) => Some(*i),
            toml::Value::String(s) => s.trim().parse().ok(),
            toml::Value::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWriterConf {
    pub on: bool,
    pub log_path: String,
    /// Rotation is not performed; kept so existing files parse.
    pub rotate_log_path: String,
    /// Warnings and errors only.
    pub wf_log_path: String,
    pub rotate_wf_log_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleWriterConf {
    pub on: bool,
    pub color: bool,
    pub json: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    #[serde(rename = "log_level")]
    pub level: String,
    pub file_writer: FileWriterConf,
    pub console_writer: ConsoleWriterConf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseSection {
    pub debug_mode: String,
    pub time_location: String,
}

/// Contents of `base.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConf {
    pub debug_mode: String,
    pub time_location: String,
    pub log: LogConfig,
    /// Older layout nesting the first two keys under `[base]`.
    pub base: BaseSection,
}

impl BaseConf {
    /// Load `base.toml` and fill unset values from `[base]`, then defaults.
    ///
    /// Fails when `time_location` is not a known IANA zone name.
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let conf = load_toml::<Self>(path)?.with_defaults();
        conf.time_zone().map_err(|message| DbError::config_load(path, message))?;
        Ok(conf)
    }

    /// Parse `time_location` into a time zone.
    pub fn time_zone(&self) -> Result<Tz, String> {
        self.time_location
            .parse::<Tz>()
            .map_err(|e| format!("invalid time_location '{}': {e}", self.time_location))
    }

    pub fn with_defaults(mut self) -> Self {
        if self.debug_mode.is_empty() {
            self.debug_mode = if self.base.debug_mode.is_empty() {
                DEFAULT_DEBUG_MODE.to_string()
            } else {
                self.base.debug_mode.clone()
            };
        }
        if self.time_location.is_empty() {
            self.time_location = if self.base.time_location.is_empty() {
                DEFAULT_TIME_LOCATION.to_string()
            } else {
                self.base.time_location.clone()
            };
        }
        if self.log.level.is_empty() {
            self.log.level = DEFAULT_LOG_LEVEL.to_string();
        }
        self
    }

    pub fn is_debug(&self) -> bool {
        self.debug_mode.eq_ignore_ascii_case("debug")
    }
}

/// One redis target. Configuration only; no client is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConf {
    pub proxy_list: Vec<String>,
    /// Contains credentials - never log
    #[serde(skip_serializing)]
    pub password: String,
    pub db: i64,
    /// Milliseconds
    pub conn_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
}

impl RedisConf {
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout)
    }
}

/// Contents of `redis_map.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisMapConf {
    #[serde(default)]
    pub list: BTreeMap<String, RedisConf>,
}

impl RedisMapConf {
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        load_toml(path.as_ref())
    }

    pub fn get(&self, name: &str) -> Option<&RedisConf> {
        self.list.get(name)
    }
}

/// Bootstrap modules that can be initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Module {
    /// base.toml: debug mode, time location, logging
    Base,
    /// redis_map.toml
    Redis,
    /// mysql_map.toml: database pools
    Mysql,
}

impl Module {
    pub const ALL: [Module; 3] = [Module::Base, Module::Redis, Module::Mysql];
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Redis => write!(f, "redis"),
            Self::Mysql => write!(f, "mysql"),
        }
    }
}

/// Command line for the bootstrap binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "svc-bootstrap",
    about = "Load service configuration, initialize logging and open database pools",
    version,
    author
)]
pub struct Config {
    /// Config directory, e.g. ./conf/dev/
    #[arg(long = "config", value_name = "DIR", env = "SVC_CONFIG")]
    pub config: Option<String>,

    /// Modules to initialize (default: all).
    /// Can be specified multiple times or as comma-separated values.
    #[arg(
        long = "module",
        value_enum,
        value_delimiter = ',',
        env = "SVC_MODULES"
    )]
    pub modules: Vec<Module>,

    /// Enable JSON console logging
    #[arg(long, env = "SVC_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            config: None,
            modules: Vec::new(),
            json_logs: false,
        }
    }

    /// Requested modules, or all of them when none were named.
    pub fn effective_modules(&self) -> Vec<Module> {
        if self.modules.is_empty() {
            Module::ALL.to_vec()
        } else {
            self.modules.clone()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
