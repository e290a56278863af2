//! Stack configuration.
//!
//! Loaded from TOML in either a flat shape or nested under a `[stack]` table.

use mamut_supervisor::ProxyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Settings shared by every component of one devnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Name of the devnet, used for the root scope and temp directories.
    pub name: String,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
    /// Seed for deterministic dev key derivation.
    pub seed: String,
    /// Install a time-travel clock at startup.
    pub time_travel: bool,
    /// Timeouts.
    pub timeouts: TimeoutConfig,
    /// Stable proxy settings.
    pub proxy: ProxySettings,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: "devnet".to_string(),
            log_level: "info".to_string(),
            seed: "mamut devnet".to_string(),
            time_travel: false,
            timeouts: TimeoutConfig::default(),
            proxy: ProxySettings::default(),
        }
    }
}

/// Timeout settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long to wait for every endpoint of a starting process.
    pub discovery_secs: u64,
    /// Grace period between SIGINT and SIGKILL.
    pub stop_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            discovery_secs: 30,
            stop_grace_secs: 10,
        }
    }
}

/// Proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Host the stable listeners bind to. The port is always ephemeral.
    pub bind_host: String,
    /// Upstream dial attempts per connection.
    pub dial_attempts: u32,
    /// Initial dial backoff.
    pub dial_backoff_ms: u64,
    /// Backoff ceiling.
    pub max_dial_backoff_ms: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        let defaults = ProxyConfig::default();
        Self {
            bind_host: "127.0.0.1".to_string(),
            dial_attempts: defaults.dial_attempts,
            dial_backoff_ms: defaults.dial_backoff.as_millis() as u64,
            max_dial_backoff_ms: defaults.max_dial_backoff.as_millis() as u64,
        }
    }
}

impl ProxySettings {
    /// Address to bind a new proxy to.
    pub fn bind_addr(&self) -> String {
        format!("{}:0", self.bind_host)
    }

    /// Converts to the supervisor's proxy configuration.
    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig::default()
            .with_dial_attempts(self.dial_attempts)
            .with_backoff(
                Duration::from_millis(self.dial_backoff_ms),
                Duration::from_millis(self.max_dial_backoff_ms),
            )
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigShape {
    Nested { stack: StackConfig },
    Flat(StackConfig),
}

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this shape.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path of the file.
        path: String,
        /// Underlying error.
        source: toml::de::Error,
    },
}

impl StackConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        match toml::from_str::<ConfigShape>(input)? {
            ConfigShape::Nested { stack } => Ok(stack),
            ConfigShape::Flat(config) => Ok(config),
        }
    }

    /// Reads and parses a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.display().to_string();
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_str.clone(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path_str,
            source,
        })
    }

    /// Discovery timeout.
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.discovery_secs)
    }

    /// Stop grace period.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.timeouts.stop_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_nested_shape() {
        let input = r#"
[stack]
name = "interop"
seed = "test seed"

[stack.timeouts]
discovery_secs = 5

[stack.proxy]
dial_attempts = 3
"#;

        let cfg = StackConfig::from_toml_str(input).expect("config should parse");
        assert_eq!(cfg.name, "interop");
        assert_eq!(cfg.seed, "test seed");
        assert_eq!(cfg.discovery_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.stop_grace(), Duration::from_secs(10));
        assert_eq!(cfg.proxy.dial_attempts, 3);
        assert_eq!(cfg.proxy.bind_host, "127.0.0.1");
    }

    #[test]
    fn parse_flat_shape() {
        let input = r#"
name = "single"
log_level = "debug"
time_travel = true
"#;

        let cfg = StackConfig::from_toml_str(input).expect("config should parse");
        assert_eq!(cfg.name, "single");
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.time_travel);
        assert_eq!(cfg.timeouts, TimeoutConfig::default());
    }

    #[test]
    fn empty_input_yields_defaults() {
        let cfg = StackConfig::from_toml_str("").expect("config should parse");
        assert_eq!(cfg, StackConfig::default());
    }

    #[test]
    fn proxy_settings_convert() {
        let settings = ProxySettings {
            bind_host: "0.0.0.0".into(),
            dial_attempts: 7,
            dial_backoff_ms: 5,
            max_dial_backoff_ms: 40,
        };
        assert_eq!(settings.bind_addr(), "0.0.0.0:0");
        let proxy = settings.proxy_config();
        assert_eq!(proxy.dial_attempts, 7);
        assert_eq!(proxy.dial_backoff, Duration::from_millis(5));
        assert_eq!(proxy.max_dial_backoff, Duration::from_millis(40));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[stack]\nname = \"from-file\"").expect("write config");

        let loaded = StackConfig::from_file(file.path()).expect("config should load");
        assert_eq!(loaded.name, "from-file");

        let err = StackConfig::from_file("/nonexistent/stack.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
