//! Service Configuration
//!
//! Read from an optional YAML file (`alerter.yaml`, or the path in
//! `ALERTER_CONFIG`) and overridden by `ALERTER__`-prefixed environment
//! variables, e.g. `ALERTER__QUEUE__HOST=broker` or `ALERTER__CONCURRENCY=8`.

use alerting::Timeouts;
use config::{Config, ConfigError, Environment, File, FileFormat};
use notify::RateLimitConfig;
use queue::MqttConfig;
use serde::Deserialize;
use std::net::SocketAddr;

const DEFAULT_CONFIG_FILE: &str = "alerter.yaml";
const CONFIG_PATH_VAR: &str = "ALERTER_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Memory,
    #[default]
    Mqtt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    Memory,
    Sqlite,
}

/// Event subscription settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub kind: QueueKind,
    pub host: String,
    pub port: u16,
    /// Generated per process when empty
    pub client_id: String,
    pub topic: String,
    pub channel: String,
    /// Delay before a requeued message is redelivered
    pub requeue_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let mqtt = MqttConfig::default();
        Self {
            kind: QueueKind::default(),
            host: mqtt.host,
            port: mqtt.port,
            client_id: mqtt.client_id,
            topic: mqtt.topic,
            channel: mqtt.channel,
            requeue_delay_ms: mqtt.requeue_delay_ms,
        }
    }
}

impl QueueConfig {
    pub fn mqtt(&self) -> MqttConfig {
        MqttConfig {
            host: self.host.clone(),
            port: self.port,
            client_id: self.client_id.clone(),
            topic: self.topic.clone(),
            channel: self.channel.clone(),
            requeue_delay_ms: self.requeue_delay_ms,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `memory` is per process; `sqlite` shares state through `database_url`
    pub kind: CacheKind,
}

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Minimum log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Prometheus listen address; metrics are not exported when unset
    pub metrics_addr: Option<SocketAddr>,
    pub queue: QueueConfig,
    /// SQLite database holding orgs, alarms, users and alerts
    pub database_url: String,
    pub cache: CacheConfig,
    pub timeouts: Timeouts,
    pub rate_limits: RateLimitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            log_level: "info".to_string(),
            log_json: false,
            metrics_addr: None,
            queue: QueueConfig::default(),
            database_url: "sqlite::memory:".to_string(),
            cache: CacheConfig::default(),
            timeouts: Timeouts::default(),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the config file and the process environment. The file is
    /// optional unless its path was given explicitly.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => File::with_name(&path).required(true),
            Err(_) => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("ALERTER").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Parse a YAML document, without environment overrides
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }
}
