//! Process bootstrap: configuration, logging and database pools.
//!
//! [`Bootstrap::init`] runs once at startup and owns everything it opens.
//! [`Bootstrap::destroy`] releases it at shutdown.

use crate::config::{
    BASE_CONF_FILE, BaseConf, ConfPaths, Config, ConfigStore, MYSQL_CONF_FILE, Module,
    REDIS_CONF_FILE, RedisMapConf,
};
use crate::db::{PoolManager, SqlEventLogger};
use crate::error::{DbError, DbResult};
use crate::logging::{self, LogGuard};
use crate::trace::{IdGenerator, TraceContext};
use chrono_tz::Tz;
use tracing::{info, warn};

/// Initialized process resources.
#[derive(Debug)]
pub struct Bootstrap {
    paths: ConfPaths,
    store: ConfigStore,
    ids: IdGenerator,
    base: Option<BaseConf>,
    time_zone: Option<Tz>,
    redis: Option<RedisMapConf>,
    pools: PoolManager,
    log_guard: Option<LogGuard>,
}

impl Bootstrap {
    /// Load the config directory `conf` and initialize `modules` in order
    /// base, redis, mysql. An empty module list initializes all of them.
    ///
    /// The first failing module aborts the bootstrap.
    pub async fn init(conf: &str, modules: &[Module]) -> DbResult<Self> {
        Self::init_inner(conf, modules, false).await
    }

    /// Bootstrap from parsed command line arguments.
    pub async fn from_args(args: &Config) -> DbResult<Self> {
        let conf = args
            .config
            .as_deref()
            .ok_or_else(|| DbError::config_load("", "no config directory given (--config)"))?;
        Self::init_inner(conf, &args.effective_modules(), args.json_logs).await
    }

    async fn init_inner(conf: &str, modules: &[Module], json_logs: bool) -> DbResult<Self> {
        let all = Module::ALL;
        let modules = if modules.is_empty() {
            &all[..]
        } else {
            modules
        };

        // Resolved before anything logs so IDs carry the right address
        let ids = IdGenerator::from_host();

        let paths = ConfPaths::parse(conf)?;
        let store = ConfigStore::load_dir(&paths.dir)?;

        let mut boot = Self {
            paths,
            store,
            ids,
            base: None,
            time_zone: None,
            redis: None,
            pools: PoolManager::new(),
            log_guard: None,
        };

        if modules.contains(&Module::Base) {
            boot.init_base(json_logs)?;
        }
        if modules.contains(&Module::Redis) {
            boot.init_redis()?;
        }
        if modules.contains(&Module::Mysql) {
            let path = boot.paths.file(MYSQL_CONF_FILE);
            boot.pools.init(&path).await?;
        }

        info!(
            config = %boot.paths.dir.display(),
            env = %boot.paths.env,
            local_ip = %boot.ids.local_ip(),
            files = boot.store.names().count(),
            pools = boot.pools.len(),
            "Config loaded"
        );
        Ok(boot)
    }

    fn init_base(&mut self, json_logs: bool) -> DbResult<()> {
        let path = self.paths.file(BASE_CONF_FILE);
        let mut base = BaseConf::load(&path)?;
        let time_zone = base
            .time_zone()
            .map_err(|message| DbError::config_load(&path, message))?;
        if json_logs {
            base.log.console_writer.json = true;
        }

        // A host application may already own the global subscriber
        if tracing::dispatcher::has_been_set() {
            warn!("Global tracing subscriber already installed, keeping it");
        } else {
            self.log_guard = Some(logging::init(&base.log)?);
        }

        info!(
            debug_mode = %base.debug_mode,
            time_location = %base.time_location,
            "Base config loaded"
        );
        self.base = Some(base);
        self.time_zone = Some(time_zone);
        Ok(())
    }

    fn init_redis(&mut self) -> DbResult<()> {
        let redis = RedisMapConf::load(self.paths.file(REDIS_CONF_FILE))?;
        info!(
            targets = ?redis.list.keys().collect::<Vec<_>>(),
            "Redis config loaded"
        );
        self.redis = Some(redis);
        Ok(())
    }

    /// Resolved config directory and environment.
    pub fn paths(&self) -> &ConfPaths {
        &self.paths
    }

    /// Environment name, e.g. `dev`.
    pub fn conf_env(&self) -> &str {
        &self.paths.env
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn base(&self) -> Option<&BaseConf> {
        self.base.as_ref()
    }

    /// Zone named by `time_location`, once the base module is loaded.
    pub fn time_zone(&self) -> Option<Tz> {
        self.time_zone
    }

    pub fn redis(&self) -> Option<&RedisMapConf> {
        self.redis.as_ref()
    }

    pub fn pools(&self) -> &PoolManager {
        &self.pools
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn local_ip(&self) -> &str {
        self.ids.local_ip()
    }

    /// Fresh trace bound to the discovered local address.
    pub fn new_trace(&self) -> TraceContext {
        self.ids.new_trace()
    }

    /// SQL event logger for `trace`, logging through `tracing`.
    ///
    /// Timestamps use the configured time zone when the base module is
    /// loaded, the host zone otherwise.
    pub fn sql_event_logger(&self, trace: TraceContext) -> SqlEventLogger {
        let logger = SqlEventLogger::with_tracing(trace, self.ids.clone());
        match self.time_zone {
            Some(tz) => logger.with_time_zone(tz),
            None => logger,
        }
    }

    /// Close every pool, then flush and release the log writers.
    ///
    /// Pool close failures are logged and returned; they do not stop the
    /// remaining pools from closing.
    pub async fn destroy(self) -> Vec<DbError> {
        info!("Releasing resources");
        let failures = self.pools.close_all().await;
        for failure in &failures {
            warn!(error = %failure, "Pool close failed");
        }
        info!("Resources released");
        drop(self.log_guard);
        failures
    }
}
