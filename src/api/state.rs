//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::relay::CommandRelay;
use crate::telemetry::Registry;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Node registry, also owns the viewer fan-out
    pub registry: Arc<Registry>,
    /// Outbound command path to nodes
    pub relay: CommandRelay,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, relay: CommandRelay, config: ApiConfig) -> Self {
        Self {
            registry,
            relay,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn viewer_count(&self) -> usize {
        self.registry.fanout().viewer_count()
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "::".to_string()
}

fn default_port() -> u16 {
    12345
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the socket address string, bracketing IPv6 hosts
    pub fn addr(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]:{}", self.host, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}
