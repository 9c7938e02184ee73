//! Configuration module for InsightVault.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, VaultError};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/insightvault.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/insightvault.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Network retrieval configuration, handed to every fetcher at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Value of the `User-Agent` header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Allow endpoints on loopback/private networks.
    #[serde(default)]
    pub allow_private_hosts: bool,
    /// Send `If-None-Match` / `If-Modified-Since` from stored validators.
    #[serde(default = "default_conditional_requests")]
    pub conditional_requests: bool,
}

fn default_user_agent() -> String {
    "InsightVaultBot/1.0".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    15
}

fn default_total_timeout() -> u64 {
    15
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_conditional_requests() -> bool {
    true
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            allow_private_hosts: false,
            conditional_requests: default_conditional_requests(),
        }
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Scheduler tick interval in seconds.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// Fetch interval for sources without their own hint, in seconds.
    #[serde(default = "default_fetch_interval")]
    pub default_fetch_interval_secs: i64,
    /// Number of sources ingested concurrently by a bulk run.
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
    /// Maximum entries considered per fetch cycle.
    #[serde(default = "default_max_items_per_fetch")]
    pub max_items_per_fetch: usize,
    /// Treat an item whose content hash already exists for the source as a duplicate.
    #[serde(default)]
    pub dedup_by_content_hash: bool,
}

fn default_update_interval() -> u64 {
    300 // 5 minutes
}

fn default_fetch_interval() -> i64 {
    3600 // 1 hour
}

fn default_max_concurrent_sources() -> usize {
    4
}

fn default_max_items_per_fetch() -> usize {
    200
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            default_fetch_interval_secs: default_fetch_interval(),
            max_concurrent_sources: default_max_concurrent_sources(),
            max_items_per_fetch: default_max_items_per_fetch(),
            dedup_by_content_hash: false,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Network retrieval configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Ingestion configuration.
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(VaultError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| VaultError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `INSIGHTVAULT_DATABASE_PATH`: Override the database path
    /// - `INSIGHTVAULT_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("INSIGHTVAULT_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(level) = std::env::var("INSIGHTVAULT_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(VaultError::Config("fetch.user_agent must not be empty".into()));
        }
        if self.fetch.total_timeout_secs == 0 {
            return Err(VaultError::Config(
                "fetch.total_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.ingest.update_interval_secs == 0 {
            return Err(VaultError::Config(
                "ingest.update_interval_secs must be greater than zero".into(),
            ));
        }
        if self.ingest.max_concurrent_sources == 0 {
            return Err(VaultError::Config(
                "ingest.max_concurrent_sources must be at least 1".into(),
            ));
        }
        if self.ingest.default_fetch_interval_secs < 0 {
            return Err(VaultError::Config(
                "ingest.default_fetch_interval_secs must not be negative".into(),
            ));
        }
        Ok(())
    }
}
