//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on unparsable values. The resulting
//! [`Config`] is handed to the client and server entry points explicitly.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the queue database.
    pub queue_dir: PathBuf,
    /// Fixed wait between failed unsubscribe attempts.
    pub retry_delay: Duration,
    /// How often a blocking queue read polls the store.
    pub poll_interval: Duration,
    /// How long the client lingers for a status message after enqueueing.
    pub status_wait: Duration,
    /// How long a server's queue lease outlives its last heartbeat.
    pub lease_ttl: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Log status lines instead of printing them, and trace HTTP traffic.
    pub debug: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `program` names the per-user cache namespace, normally the stem of
    /// `argv[0]`. In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env(program: &str) -> Result<Self> {
        let queue_dir = match std::env::var_os("UNSUBSCRIBER_QUEUE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .ok_or_else(|| Error::Config("cannot determine user cache directory".to_string()))?
                .join(program),
        };

        Ok(Self {
            queue_dir,
            retry_delay: Duration::from_secs(parsed_var("UNSUBSCRIBER_RETRY_DELAY_SECS", 30)?),
            poll_interval: Duration::from_millis(parsed_var("UNSUBSCRIBER_POLL_INTERVAL_MS", 500)?),
            status_wait: Duration::from_millis(parsed_var("UNSUBSCRIBER_STATUS_WAIT_MS", 2000)?),
            lease_ttl: Duration::from_secs(parsed_var("UNSUBSCRIBER_LEASE_TTL_SECS", 30)?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
            debug: false,
        })
    }

    /// Apply the `--debug` switch. Also raises the default log level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        if debug {
            self.log_level = "debug".to_string();
        }
        self
    }

    /// Path of the SQLite file backing both queues.
    pub fn database_path(&self) -> PathBuf {
        self.queue_dir.join("data.db")
    }
}

/// Program name used to namespace the cache directory: the file stem of
/// `argv0`, falling back to the crate's binary name.
pub fn program_name(argv0: Option<&str>) -> String {
    argv0
        .and_then(|arg| Path::new(arg).file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("discourse_unsubscriber")
        .to_string()
}

fn parsed_var(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}
