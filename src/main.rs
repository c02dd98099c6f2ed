//! svc-bootstrap - Main entry point.
//!
//! Initializes the requested modules from a config directory, checks the
//! default pool with one logged query, then releases everything.

use svc_bootstrap::config::Config;
use svc_bootstrap::{Bootstrap, QueryLogger};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();

    if config.config.is_none() {
        eprintln!("Error: a config directory must be given.");
        eprintln!();
        eprintln!("Usage: svc-bootstrap --config <dir> [--module base|redis|mysql]...");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  svc-bootstrap --config ./conf/dev/");
        eprintln!("  svc-bootstrap --config ./conf/dev/ --module base --module mysql");
        eprintln!("  SVC_CONFIG=./conf/prod/ svc-bootstrap --json-logs");
        std::process::exit(1);
    }

    let boot = match Bootstrap::from_args(&config).await {
        Ok(boot) => boot,
        Err(e) => {
            eprintln!("Error: bootstrap failed: {e}");
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {suggestion}");
            }
            std::process::exit(1);
        }
    };

    info!(
        conf_dir = %boot.paths().dir.display(),
        conf_env = %boot.conf_env(),
        "svc-bootstrap v{} ready",
        env!("CARGO_PKG_VERSION")
    );

    if let Some(pool) = boot.pools().default_pool() {
        let trace = boot.new_trace();
        let logger = QueryLogger::default();
        if let Err(e) = logger.execute_logged(pool, &trace, "SELECT 1", &[]).await {
            error!(error = %e, trace_id = %trace.trace_id, "Default pool check failed");
        }
    }

    let failures = boot.destroy().await;
    if !failures.is_empty() {
        return Err(format!("{} pool(s) failed to close", failures.len()).into());
    }
    Ok(())
}
