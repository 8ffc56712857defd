//! Configuration loading for gate-authz.
//!
//! Configuration is loaded from a TOML file (default: `authz.toml`). Every
//! section and field is optional; `RELAY_URL` and `BROWSER_BASE_URL` override
//! the relay section from the command line.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Longest check timeout accepted, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Root configuration for gate-authz.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Relay link configuration.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Check listener configuration.
    #[serde(default)]
    pub check: CheckConfig,
    /// Admin listener configuration.
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Relay link configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Relay base URL (default: ws://localhost:9090).
    #[serde(default = "default_relay_url")]
    pub url: String,
    /// Base URL the device page is served under (default: http://localhost:9090).
    #[serde(default = "default_device_base_url")]
    pub device_base_url: String,
    /// Re-establish the relay link when it drops (default: true).
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
}

/// Check listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    /// Bind address for ext_authz checks (default: 0.0.0.0:9000).
    #[serde(default = "default_check_bind_address")]
    pub bind_address: String,
    /// Seconds to wait for a decision before denying (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Checks buffered for the relay link before new ones are refused (default: 100).
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

/// Admin listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Bind address for health, metrics and onboarding (default: 127.0.0.1:9001).
    #[serde(default = "default_admin_bind_address")]
    pub bind_address: String,
}

// Default value functions
fn default_relay_url() -> String {
    "ws://localhost:9090".to_string()
}

fn default_device_base_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_reconnect() -> bool {
    true
}

fn default_check_bind_address() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_queue_depth() -> usize {
    100
}

fn default_admin_bind_address() -> String {
    "127.0.0.1:9001".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            device_base_url: default_device_base_url(),
            reconnect: default_reconnect(),
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            bind_address: default_check_bind_address(),
            timeout_secs: default_timeout_secs(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: default_admin_bind_address(),
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

    /// How long a check waits for a decision.
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check.timeout_secs)
    }

    /// The parsed check listener address.
    pub fn check_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("check.bind_address", &self.check.bind_address)
    }

    /// The parsed admin listener address.
    pub fn admin_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("admin.bind_address", &self.admin.bind_address)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_addr()?;
        self.admin_addr()?;
        if !(self.relay.url.starts_with("ws://") || self.relay.url.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                field: "relay.url",
                reason: format!("expected a ws:// or wss:// URL, got {}", self.relay.url),
            });
        }
        if self.relay.device_base_url.is_empty() {
            return Err(ConfigError::Invalid {
                field: "relay.device_base_url",
                reason: "must not be empty".into(),
            });
        }
        let nonzero = [
            ("check.timeout_secs", self.check.timeout_secs),
            ("check.queue_depth", self.check.queue_depth as u64),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.check.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid {
                field: "check.timeout_secs",
                reason: format!("must be at most {MAX_TIMEOUT_SECS}"),
            });
        }
        Ok(())
    }
}

fn parse_addr(field: &'static str, raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        field,
        reason: format!("not a socket address: {raw}"),
    })
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.relay.url, "ws://localhost:9090");
        assert_eq!(config.relay.device_base_url, "http://localhost:9090");
        assert!(config.relay.reconnect);
        assert_eq!(config.check.bind_address, "0.0.0.0:9000");
        assert_eq!(config.check_timeout(), Duration::from_secs(30));
        assert_eq!(config.check.queue_depth, 100);
        assert_eq!(config.admin.bind_address, "127.0.0.1:9001");
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let toml = r#"
[relay]
url = "wss://relay.example.com"

[check]
timeout_secs = 5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.relay.url, "wss://relay.example.com");
        assert_eq!(config.relay.device_base_url, "http://localhost:9090");
        assert_eq!(config.check.timeout_secs, 5);
        assert_eq!(config.check.queue_depth, 100);
        config.validate().unwrap();
    }

    #[test]
    fn relay_url_must_be_websocket() {
        let mut config = Config::default();
        config.relay.url = "http://relay:9090".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "relay.url",
                ..
            })
        ));
    }

    #[test]
    fn zero_timeout_and_depth_rejected() {
        let mut config = Config::default();
        config.check.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.check.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn timeout_above_an_hour_rejected() {
        let mut config = Config::default();
        config.check.timeout_secs = MAX_TIMEOUT_SECS;
        config.validate().unwrap();

        for timeout_secs in [MAX_TIMEOUT_SECS + 1, u64::MAX] {
            config.check.timeout_secs = timeout_secs;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid {
                    field: "check.timeout_secs",
                    ..
                })
            ));
        }
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[check]\ntimeout_secs = \"soon\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
