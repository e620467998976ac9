//! Application configuration.
//!
//! Loaded from environment variables with defaults, overlaid by a thin `clap`
//! CLI for local ergonomics -- following the nested-struct-with-defaults shape
//! of the orchestrator core's own `ControllerConfig`, adapted from a mounted
//! ConfigMap source to plain env vars.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "inspection-server", about = "Inspection orchestration core")]
pub struct Cli {
    /// Base data directory (overrides DATA_DIR)
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Bind address (overrides BIND_ADDR)
    #[arg(long, env = "BIND_ADDR")]
    pub bind: Option<String>,

    /// Run pending migrations and exit, without starting the HTTP server.
    #[arg(long, default_value_t = false)]
    pub migrate_only: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub license_secret: Option<String>,
    pub prometheus_url: Option<String>,
    pub bind_addr: String,
    pub lease_ttl: Duration,
    pub stale_sweep_interval: Duration,
    pub default_command_timeout: Duration,
    pub promql_timeout: Duration,
    pub probe_timeout: Duration,
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

impl AppConfig {
    pub fn load(cli: &Cli) -> Self {
        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| std::env::var("DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/app/data"));

        let bind_addr = cli
            .bind
            .clone()
            .or_else(|| std::env::var("BIND_ADDR").ok())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        Self {
            data_dir,
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            license_secret: std::env::var("LICENSE_SECRET").ok().filter(|s| !s.is_empty()),
            prometheus_url: std::env::var("PROMETHEUS_URL").ok().filter(|s| !s.is_empty()),
            bind_addr,
            lease_ttl: env_duration_secs("LEASE_TTL_SECONDS", 300),
            stale_sweep_interval: env_duration_secs("STALE_SWEEP_INTERVAL_SECONDS", 30),
            default_command_timeout: env_duration_secs("DEFAULT_COMMAND_TIMEOUT_SECONDS", 30),
            promql_timeout: env_duration_secs("PROMQL_TIMEOUT_SECONDS", 10),
            probe_timeout: env_duration_secs("PROBE_TIMEOUT_SECONDS", 10),
        }
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.data_dir.join("configs")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub fn license_path(&self) -> PathBuf {
        self.data_dir.join("license.txt")
    }

    /// Resolved sqlx connection string: the explicit `DATABASE_URL` if set,
    /// otherwise an embedded SQLite file under the data directory.
    pub fn resolved_database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite://{}?mode=rwc",
                self.data_dir.join("inspection.db").display()
            ),
        }
    }
}
