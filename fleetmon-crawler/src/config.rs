//! Configuration management for the fleetmon crawler
//!
//! Supports loading from TOML files and environment variables.

use crate::crawler::CrawlerOptions;
use fleetmon_metadata::{StoreConfig, DB_FILE_NAME};
use fleetmon_timeseries::InfluxConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete crawler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Learning and collection cadence
    #[serde(default)]
    pub crawler: CrawlerSettings,

    /// Metadata store (SQLite)
    #[serde(default)]
    pub storage: StorageSettings,

    /// Time-series store (InfluxDB)
    #[serde(default)]
    pub influx: InfluxSettings,

    /// Seednode and chain provider endpoints
    #[serde(default)]
    pub network: NetworkSettings,

    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl CrawlerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: CrawlerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawler.learning_interval_ms == 0
            || self.crawler.slow_learning_interval_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "learning intervals cannot be 0".to_string(),
            ));
        }
        if self.crawler.metrics_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "metrics interval cannot be 0".to_string(),
            ));
        }
        if self.influx.database.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "InfluxDB database name cannot be empty".to_string(),
            ));
        }
        if self.influx.port == 0 {
            return Err(ConfigError::ValidationError(
                "InfluxDB port cannot be 0".to_string(),
            ));
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::ValidationError(
                "metrics port cannot be 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        db_path: Option<PathBuf>,
        teacher_uri: Option<String>,
        learn_on_launch: bool,
    ) -> Self {
        if let Some(path) = db_path {
            self.storage.db_path = path;
        }
        if let Some(uri) = teacher_uri {
            self.network.teacher_uri = Some(uri);
        }
        if learn_on_launch {
            self.crawler.learn_on_launch = true;
        }
        self
    }

    /// Apply environment variable overrides to all settings
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("CRAWLER_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(ms) = env_parse("CRAWLER_LEARNING_INTERVAL_MS") {
            self.crawler.learning_interval_ms = ms;
        }
        if let Some(secs) = env_parse("CRAWLER_METRICS_INTERVAL_SECS") {
            self.crawler.metrics_interval_secs = secs;
        }

        if let Ok(host) = std::env::var("INFLUXDB_HOST") {
            self.influx.host = host;
        }
        if let Some(port) = env_parse("INFLUXDB_PORT") {
            self.influx.port = port;
        }
        if let Ok(database) = std::env::var("INFLUXDB_DATABASE") {
            self.influx.database = database;
        }

        if let Ok(uri) = std::env::var("CRAWLER_TEACHER_URI") {
            self.network.teacher_uri = Some(uri);
        }
        if let Ok(url) = std::env::var("CHAIN_PROVIDER_URL") {
            self.network.chain_provider_url = Some(url);
        }

        if let Some(port) = env_parse("CRAWLER_METRICS_PORT") {
            self.metrics.port = port;
        }

        self
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.storage.db_path.clone(),
            ephemeral: self.storage.ephemeral,
            max_connections: self.storage.max_connections,
            connect_timeout: Duration::from_secs(self.storage.connect_timeout_secs),
        }
    }

    pub fn influx_config(&self) -> InfluxConfig {
        InfluxConfig {
            host: self.influx.host.clone(),
            port: self.influx.port,
            database: self.influx.database.clone(),
            retention_policy: self.influx.retention_policy.clone(),
            retention_duration: self.influx.retention_duration.clone(),
            replication: self.influx.replication,
            timeout: Duration::from_secs(self.influx.timeout_secs),
        }
    }

    pub fn crawler_options(&self) -> CrawlerOptions {
        CrawlerOptions {
            learning_interval: Duration::from_millis(self.crawler.learning_interval_ms),
            slow_learning_interval: Duration::from_secs(self.crawler.slow_learning_interval_secs),
            rounds_before_slowdown: self.crawler.rounds_without_nodes_before_slowdown,
            metrics_interval: Duration::from_secs(self.crawler.metrics_interval_secs),
            learn_on_launch: self.crawler.learn_on_launch,
            max_fleet_states: self.crawler.max_fleet_states,
            chain_concurrency: self.crawler.chain_concurrency,
            peer_concurrency: self.crawler.peer_concurrency,
            database: self.influx.database.clone(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Learning and collection cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerSettings {
    /// Delay between learning rounds
    #[serde(default = "default_learning_interval")]
    pub learning_interval_ms: u64,

    /// Delay once rounds stop finding new nodes
    #[serde(default = "default_slow_learning_interval")]
    pub slow_learning_interval_secs: u64,

    #[serde(default = "default_rounds_before_slowdown")]
    pub rounds_without_nodes_before_slowdown: u32,

    /// Delay between chain metrics rounds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Run the first learning round immediately on start
    #[serde(default)]
    pub learn_on_launch: bool,

    /// Fleet states kept in the store (0 = unlimited)
    #[serde(default)]
    pub max_fleet_states: usize,

    /// Concurrent stake lookups per metrics round
    #[serde(default = "default_chain_concurrency")]
    pub chain_concurrency: usize,

    /// Concurrent peer verifications per learning round
    #[serde(default = "default_peer_concurrency")]
    pub peer_concurrency: usize,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            learning_interval_ms: default_learning_interval(),
            slow_learning_interval_secs: default_slow_learning_interval(),
            rounds_without_nodes_before_slowdown: default_rounds_before_slowdown(),
            metrics_interval_secs: default_metrics_interval(),
            learn_on_launch: false,
            max_fleet_states: 0,
            chain_concurrency: default_chain_concurrency(),
            peer_concurrency: default_peer_concurrency(),
        }
    }
}

fn default_learning_interval() -> u64 {
    500
}

fn default_slow_learning_interval() -> u64 {
    30
}

fn default_rounds_before_slowdown() -> u32 {
    25
}

fn default_metrics_interval() -> u64 {
    60
}

fn default_chain_concurrency() -> usize {
    4
}

fn default_peer_concurrency() -> usize {
    8
}

/// Metadata store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Delete the database file on shutdown
    #[serde(default)]
    pub ephemeral: bool,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            ephemeral: false,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// `~/.fleetmon/crawler-storage.sqlite`
fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fleetmon")
        .join(DB_FILE_NAME)
}

fn default_max_connections() -> u32 {
    4
}

fn default_connect_timeout() -> u64 {
    5
}

/// InfluxDB settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxSettings {
    #[serde(default = "default_influx_host")]
    pub host: String,

    #[serde(default = "default_influx_port")]
    pub port: u16,

    #[serde(default = "default_influx_database")]
    pub database: String,

    #[serde(default = "default_retention_policy")]
    pub retention_policy: String,

    #[serde(default = "default_retention_duration")]
    pub retention_duration: String,

    #[serde(default = "default_replication")]
    pub replication: u32,

    #[serde(default = "default_influx_timeout")]
    pub timeout_secs: u64,
}

impl Default for InfluxSettings {
    fn default() -> Self {
        Self {
            host: default_influx_host(),
            port: default_influx_port(),
            database: default_influx_database(),
            retention_policy: default_retention_policy(),
            retention_duration: default_retention_duration(),
            replication: default_replication(),
            timeout_secs: default_influx_timeout(),
        }
    }
}

fn default_influx_host() -> String {
    "localhost".to_string()
}

fn default_influx_port() -> u16 {
    8086
}

fn default_influx_database() -> String {
    "network".to_string()
}

fn default_retention_policy() -> String {
    "network_info_retention".to_string()
}

fn default_retention_duration() -> String {
    "5w".to_string()
}

fn default_replication() -> u32 {
    1
}

fn default_influx_timeout() -> u64 {
    10
}

/// External endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Seednode REST URI used to bootstrap a teacher
    #[serde(default)]
    pub teacher_uri: Option<String>,

    /// Chain state REST provider
    #[serde(default)]
    pub chain_provider_url: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            teacher_uri: None,
            chain_provider_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Enable the Prometheus exporter
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9102
}
