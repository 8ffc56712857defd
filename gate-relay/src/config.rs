//! Configuration loading for gate-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and field is optional.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Root configuration for gate-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Limits on connections and frames.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// Idle session cleanup configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for WebSocket and HTTP endpoints (default: 0.0.0.0:9090).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Limits on connections and frames.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum connection attempts per tenant per minute (default: 60).
    #[serde(default = "default_connects_per_minute")]
    pub connects_per_minute: u32,
    /// Largest WebSocket message accepted, in bytes (default: 64 KiB).
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Frames buffered between a socket and its forwarding task (default: 64).
    #[serde(default = "default_link_buffer")]
    pub link_buffer: usize,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

/// Idle session cleanup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Cleanup interval in seconds (default: 60).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Seconds a session with no attached side is kept (default: 300).
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
    /// Enable cleanup task (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_connects_per_minute() -> u32 {
    60
}

fn default_max_frame_size() -> usize {
    64 * 1024 // 64 KiB
}

fn default_link_buffer() -> usize {
    64
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_idle_secs() -> u64 {
    300 // 5 minutes
}

fn default_cleanup_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connects_per_minute: default_connects_per_minute(),
            max_frame_size: default_max_frame_size(),
            link_buffer: default_link_buffer(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            idle_secs: default_idle_secs(),
            enabled: default_cleanup_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the port of `server.bind_address` (the `PORT` override).
    pub fn override_port(&mut self, port: u16) -> Result<(), ConfigError> {
        let mut addr = self.bind_addr()?;
        addr.set_port(port);
        self.server.bind_address = addr.to_string();
        Ok(())
    }

    /// The parsed bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::Invalid {
                field: "server.bind_address",
                reason: format!("not a socket address: {}", self.server.bind_address),
            })
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        let nonzero = [
            ("limits.connects_per_minute", self.limits.connects_per_minute as u64),
            ("limits.max_frame_size", self.limits.max_frame_size as u64),
            ("limits.link_buffer", self.limits.link_buffer as u64),
            ("cleanup.interval_secs", self.cleanup.interval_secs),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
