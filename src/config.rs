use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::syslog::hostname::DEFAULT_HOST_FILE;
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub syslog: SyslogConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_guest")]
    pub username: String,
    #[serde(default = "default_guest")]
    pub password: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyslogConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_pid")]
    pub pid: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub append_tag: String,
    #[serde(default)]
    pub structured_data: Option<String>,
    #[serde(default = "default_data")]
    pub data: String,
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    #[serde(default = "default_host_file")]
    pub host_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_key")]
    pub key: String,
    #[serde(default = "default_true")]
    pub omit_with_empty_routing_key: bool,
    #[serde(default = "default_true")]
    pub omit_with_default_routing_key: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

impl Config {
    /// Loads configuration from an optional file, overridden by
    /// `SYSLOG_AMQP_*` environment variables (`__` separates sections).
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SYSLOG_AMQP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be greater than zero".to_string()));
        }
        if self.broker.address.is_empty() {
            return Err(Error::Config("broker.address must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            syslog: SyslogConfig::default(),
            routing: RoutingConfig::default(),
            retry: RetryConfig::default(),
            debug: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl BrokerConfig {
    pub fn amqp_uri(&self) -> String {
        format!("amqp://{}:{}@{}", self.username, self.password, self.address)
    }

    /// The broker URI with the password masked, for logging.
    pub fn redacted_uri(&self) -> String {
        format!("amqp://{}:****@{}", self.username, self.address)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            username: default_guest(),
            password: default_guest(),
            exchange: default_exchange(),
        }
    }
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            priority: default_priority(),
            pid: default_pid(),
            hostname: None,
            tag: None,
            append_tag: String::new(),
            structured_data: None,
            data: default_data(),
            timestamp: default_timestamp(),
            host_file: default_host_file(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            key: default_routing_key(),
            omit_with_empty_routing_key: true,
            omit_with_default_routing_key: true,
        }
    }
}

impl RetryConfig {
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1000
}

fn default_address() -> String {
    "localhost:5672".to_string()
}

fn default_guest() -> String {
    "guest".to_string()
}

fn default_exchange() -> String {
    "logspout".to_string()
}

fn default_format() -> String {
    "rfc5424".to_string()
}

fn default_priority() -> String {
    "{{.Priority}}".to_string()
}

fn default_pid() -> String {
    "{{.Pid}}".to_string()
}

fn default_data() -> String {
    "{{.Data}}".to_string()
}

fn default_timestamp() -> String {
    "{{.Timestamp}}".to_string()
}

fn default_host_file() -> PathBuf {
    PathBuf::from(DEFAULT_HOST_FILE)
}

fn default_routing_key() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_retry_count() -> u32 {
    10
}

fn default_backoff_unit_ms() -> u64 {
    1
}
