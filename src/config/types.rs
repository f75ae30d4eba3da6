//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::chanserv::ChanServConfig;
use super::defaults::{
    default_chanserv_nick, default_database_path, default_save_interval, default_uplink_host,
    default_uplink_port,
};
use super::protocol::ProtocolConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Services configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Services identity and runtime options.
    pub services: ServicesConfig,
    /// Where the dialect bridge feeds us events.
    #[serde(default)]
    pub uplink: UplinkConfig,
    /// Channel service behaviour.
    #[serde(default)]
    pub chanserv: ChanServConfig,
    /// Dialect description.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Snapshot storage.
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Services identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Services server name (e.g., "services.straylight.net").
    pub name: String,
    /// TS6 server ID (e.g., "00A").
    pub sid: String,
    /// Nick the channel service speaks as.
    #[serde(default = "default_chanserv_nick")]
    pub chanserv_nick: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus HTTP port. Unset or 0 disables the endpoint.
    pub metrics_port: Option<u16>,
}

/// Uplink bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UplinkConfig {
    #[serde(default = "default_uplink_host")]
    pub host: String,
    #[serde(default = "default_uplink_port")]
    pub port: u16,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            host: default_uplink_host(),
            port: default_uplink_port(),
        }
    }
}

impl UplinkConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Snapshot database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the JSON snapshot.
    #[serde(default = "default_database_path")]
    pub path: String,
    /// Seconds between periodic saves. 0 saves only on shutdown.
    #[serde(default = "default_save_interval")]
    pub save_interval: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            save_interval: default_save_interval(),
        }
    }
}
