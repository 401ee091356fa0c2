//! Beacon Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use beacon_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[node]\nrole = \"daemon\"").unwrap();
//! ```
//!
//! # Example Minimal Config
//!
//! ```toml
//! [node]
//! role = "daemon"
//! listen_port = 22500
//!
//! [node.upstream]
//! host = "leader.cluster"
//! port = 22501
//! ```

mod error;
mod global;
mod logging;
mod node;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};
pub use global::{GlobalConfig, OverflowSetting};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use node::{NodeConfig, NodeRole, UpstreamConfig};

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process identity and peer addressing
    pub node: NodeConfig,

    /// Queue sizes, timeouts, id-space bounds
    pub global: GlobalConfig,

    /// Internal logging behavior
    pub log: LogConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        raw.parse()
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_valid() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config.node.role, NodeRole::Client);
        assert!(config.global.ring_capacity > 0);
    }

    #[test]
    fn test_minimal_daemon_config() {
        let config: Config = r#"
[node]
role = "daemon"
listen_port = 22500

[node.upstream]
host = "leader.cluster"
port = 22501
"#
        .parse()
        .unwrap();
        assert_eq!(config.node.role, NodeRole::Daemon);
        assert_eq!(config.node.listen_port, 22500);
        assert_eq!(config.node.upstream.as_ref().unwrap().port, 22501);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[global]\nring_capacity = 64").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.global.ring_capacity, 64);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/beacon.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_parse_error() {
        let err = "[node\nrole = ".parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
