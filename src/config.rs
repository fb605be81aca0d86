use crate::flush::UnknownOptionPolicy;
use std::env;

/// Runtime configuration, loaded from environment variables with
/// defaults. A `.env` file is honored via dotenv before this runs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Message bus endpoint (Redis URL).
    pub bus_url: String,

    /// Pub/sub channel carrying raw vote payloads.
    pub bus_channel: String,

    /// Path to the SQLite aggregate store.
    pub db_path: String,

    /// Directory of idempotent schema files run at startup.
    pub schema_dir: String,

    /// Flush cycle interval in milliseconds.
    pub flush_interval_ms: u64,

    /// Upper bound on the shutdown drain wait, in milliseconds.
    pub shutdown_timeout_ms: u64,

    /// Whether a store write matching no poll should be logged.
    pub unknown_option_policy: UnknownOptionPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `VOTEFLOW_BUS_URL` (default: redis://127.0.0.1:6379)
    /// - `VOTEFLOW_BUS_CHANNEL` (default: votes)
    /// - `VOTEFLOW_DB_PATH` (default: voteflow.db)
    /// - `VOTEFLOW_SCHEMA_DIR` (default: sql)
    /// - `FLUSH_INTERVAL_MS` (default: 1000)
    /// - `SHUTDOWN_TIMEOUT_MS` (default: 5000)
    /// - `LOG_UNKNOWN_OPTIONS` (default: false)
    pub fn from_env() -> Self {
        Self {
            bus_url: env::var("VOTEFLOW_BUS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            bus_channel: env::var("VOTEFLOW_BUS_CHANNEL").unwrap_or_else(|_| "votes".to_string()),

            db_path: env::var("VOTEFLOW_DB_PATH").unwrap_or_else(|_| "voteflow.db".to_string()),

            schema_dir: env::var("VOTEFLOW_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),

            flush_interval_ms: env::var("FLUSH_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1_000),

            shutdown_timeout_ms: env::var("SHUTDOWN_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5_000),

            unknown_option_policy: if env::var("LOG_UNKNOWN_OPTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false)
            {
                UnknownOptionPolicy::Warn
            } else {
                UnknownOptionPolicy::Ignore
            },
        }
    }
}

/// Printed alongside the error on fatal startup failures.
pub fn print_usage() {
    eprintln!("voteflow - streaming vote aggregator");
    eprintln!();
    eprintln!("Configuration (environment variables, .env supported):");
    eprintln!("  VOTEFLOW_BUS_URL      bus endpoint (default: redis://127.0.0.1:6379)");
    eprintln!("  VOTEFLOW_BUS_CHANNEL  pub/sub channel (default: votes)");
    eprintln!("  VOTEFLOW_DB_PATH      SQLite store path (default: voteflow.db)");
    eprintln!("  VOTEFLOW_SCHEMA_DIR   schema file directory (default: sql)");
    eprintln!("  FLUSH_INTERVAL_MS     flush interval (default: 1000)");
    eprintln!("  SHUTDOWN_TIMEOUT_MS   shutdown drain bound (default: 5000)");
    eprintln!("  LOG_UNKNOWN_OPTIONS   warn on unmatched options (default: false)");
}
