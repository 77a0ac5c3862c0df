//! Configuration file management.

use std::path::PathBuf;

use gbnet_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "GBNET_DATA_DIR";

/// Complete daemon configuration, read from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Plan rules: BV decay, levels, slabs, wallet limits and STK.
    #[serde(default)]
    pub compensation: EngineConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Socket and scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket file name inside the data directory.
    #[serde(default = "default_socket_name")]
    pub socket_name: String,
    /// Run the daily sweep and monthly salary run at 00:00 UTC.
    #[serde(default = "default_true")]
    pub maintenance_enabled: bool,
    /// Capacity of each event subscriber's buffer.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_socket_name() -> String {
    "gbnetd.sock".to_string()
}

fn default_true() -> bool {
    true
}

fn default_event_buffer() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_name: default_socket_name(),
            maintenance_enabled: true,
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist. The compensation
    /// rules are validated either way.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };
        config.compensation.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.data_dir().join(&self.server.socket_name)
    }

    /// `tracing` directive for the configured log level.
    pub fn log_directive(&self) -> String {
        format!("gbnet={}", self.advanced.log_level)
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/GBNet")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".gbnet")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/gbnet"))
}
