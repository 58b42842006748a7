//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::api::ApiConfig;
use crate::relay::TransportConfig;
use crate::telemetry::RegistryConfig;
use crate::websocket::FanoutConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ApiConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("sensorhub").join("config.toml")),
            Some(PathBuf::from("/etc/sensorhub/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `SENSORHUB_*` overrides looked up through `var`.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(host) = var("SENSORHUB_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("SENSORHUB_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        // Registry overrides
        if let Some(history) = var("SENSORHUB_HISTORY").and_then(|v| v.parse().ok()) {
            self.registry.history_capacity = history;
        }
        if let Some(stale) = var("SENSORHUB_STALE_TIME_MS").and_then(|v| v.parse().ok()) {
            self.registry.stale_time_ms = stale;
        }
        if let Some(sweep) = var("SENSORHUB_SWEEP_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.registry.sweep_interval_ms = sweep;
        }

        // Transport overrides
        if let Some(port) = var("SENSORHUB_DEVICE_PORT").and_then(|v| v.parse().ok()) {
            self.transport.device_port = port;
        }

        // Logging overrides
        if let Some(level) = var("SENSORHUB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("SENSORHUB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Sensorhub Configuration
#
# Environment variables override these settings:
# - SENSORHUB_HOST
# - SENSORHUB_PORT
# - SENSORHUB_HISTORY
# - SENSORHUB_STALE_TIME_MS
# - SENSORHUB_SWEEP_INTERVAL_MS
# - SENSORHUB_DEVICE_PORT
# - SENSORHUB_LOG_LEVEL
# - SENSORHUB_LOG_FORMAT

[server]
# Address to bind to ("::" listens on IPv6 and IPv4)
host = "::"

# Port for device endpoints, API and viewer socket
port = 12345

[registry]
# Samples kept per channel
history_capacity = 50

# A node without readings for this long is stale (ms)
stale_time_ms = 2000

# How often liveness is re-evaluated (ms)
sweep_interval_ms = 500

[fanout]
# Maximum concurrent viewers
max_viewers = 1000

# Events buffered per viewer before it is resynchronised
channel_capacity = 1024

[transport]
# Scheme used to reach nodes
scheme = "http"

# Port nodes listen on
device_port = 5683

# Per-request timeout (ms)
request_timeout_ms = 5000

# Resource observed after a node registers
sense_resource = "sense"

# Observation re-read period (ms), 0 reads once per registration
observe_interval_ms = 1000

# Resource read by the status poller
status_resource = "status"

# Status poll period (ms), 0 disables polling
status_poll_interval_ms = 30000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 12345);
        assert_eq!(config.server.host, "::");
        assert_eq!(config.registry.history_capacity, 50);
        assert_eq!(config.registry.stale_time_ms, 2000);
        assert_eq!(config.fanout.max_viewers, 1000);
        assert_eq!(config.transport.device_port, 5683);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses_to_defaults() {
        let parsed: Config = toml::from_str(&generate_default_config()).unwrap();
        let defaults = Config::default();

        assert_eq!(parsed.server.addr(), defaults.server.addr());
        assert_eq!(parsed.registry.history_capacity, defaults.registry.history_capacity);
        assert_eq!(parsed.registry.stale_time_ms, defaults.registry.stale_time_ms);
        assert_eq!(parsed.registry.sweep_interval_ms, defaults.registry.sweep_interval_ms);
        assert_eq!(parsed.fanout.channel_capacity, defaults.fanout.channel_capacity);
        assert_eq!(
            parsed.transport.status_poll_interval_ms,
            defaults.transport.status_poll_interval_ms
        );
        assert_eq!(
            parsed.transport.observe_interval_ms,
            defaults.transport.observe_interval_ms
        );
        assert_eq!(parsed.logging.level, defaults.logging.level);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[registry]\nstale_time_ms = 5000\n\n[server]\nport = 8080").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.registry.stale_time_ms, 5000);
        assert_eq!(config.registry.history_capacity, 50);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "::");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/sensorhub.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[registry\nstale_time_ms = ").unwrap();

        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("SENSORHUB_PORT", "9000"),
            ("SENSORHUB_HISTORY", "10"),
            ("SENSORHUB_STALE_TIME_MS", "bogus"),
            ("SENSORHUB_DEVICE_PORT", "5684"),
            ("SENSORHUB_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.registry.history_capacity, 10);
        // Unparseable values leave the setting alone
        assert_eq!(config.registry.stale_time_ms, 2000);
        assert_eq!(config.transport.device_port, 5684);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.server.host, "::");
    }
}
