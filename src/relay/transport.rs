//! Device Transport
//!
//! The boundary between the core and the network that reaches the nodes.
//! `HttpTransport` speaks the HTTP mapping of the node protocol: commands
//! become `PUT <endpoint>` with a text payload, resource reads become `GET`.

use async_trait::async_trait;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

use super::observer::OBSERVE_INTERVAL_MS;

/// Errors from the transport layer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Node answered with status {0}")]
    Status(u16),

    #[error("Invalid target address: {0}")]
    InvalidTarget(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.to_string())
    }
}

/// Something that can deliver requests to a node
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `payload` to `endpoint` on the node at `target`
    async fn send(&self, target: &str, endpoint: &str, payload: String)
        -> Result<(), TransportError>;

    /// Read `resource` from the node at `target`
    async fn fetch(&self, target: &str, resource: &str) -> Result<String, TransportError>;
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// URL scheme used to reach nodes
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Port nodes listen on when the target carries none
    #[serde(default = "default_device_port")]
    pub device_port: u16,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Resource observed after a node registers
    #[serde(default = "default_sense_resource")]
    pub sense_resource: String,
    /// Observation re-read period in milliseconds, 0 reads once
    #[serde(default = "default_observe_interval")]
    pub observe_interval_ms: u64,
    /// Resource read by the status poller
    #[serde(default = "default_status_resource")]
    pub status_resource: String,
    /// Status poll period in milliseconds, 0 disables polling
    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval_ms: u64,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_device_port() -> u16 {
    5683
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_sense_resource() -> String {
    "sense".to_string()
}

fn default_observe_interval() -> u64 {
    OBSERVE_INTERVAL_MS
}

fn default_status_resource() -> String {
    "status".to_string()
}

fn default_status_poll_interval() -> u64 {
    30_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            device_port: default_device_port(),
            request_timeout_ms: default_request_timeout(),
            sense_resource: default_sense_resource(),
            observe_interval_ms: default_observe_interval(),
            status_resource: default_status_resource(),
            status_poll_interval_ms: default_status_poll_interval(),
        }
    }
}

/// HTTP client for nodes
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// Build the URL for `path` on the node at `target`.
    ///
    /// `target` is an IP address, a socket address, or a host name.
    /// IPv6 addresses are bracketed and the configured device port is used
    /// unless the target names its own. Each `/`-separated segment of `path`
    /// is percent-encoded, so `?` or `#` in an endpoint name stay part of it.
    pub fn url(&self, target: &str, path: &str) -> Result<String, TransportError> {
        let target = target.trim();

        let authority = if let Ok(addr) = target.parse::<SocketAddr>() {
            addr.to_string()
        } else if let Ok(ip) = target.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            SocketAddr::new(ip, self.config.device_port).to_string()
        } else if !target.is_empty()
            && target
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            format!("{}:{}", target, self.config.device_port)
        } else {
            return Err(TransportError::InvalidTarget(target.to_string()));
        };

        let invalid = || TransportError::InvalidTarget(target.to_string());
        let mut url = reqwest::Url::parse(&format!("{}://{}/", self.config.scheme, authority))
            .map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .clear()
            .extend(path.trim_start_matches('/').split('/'));
        Ok(url.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        target: &str,
        endpoint: &str,
        payload: String,
    ) -> Result<(), TransportError> {
        let url = self.url(target, endpoint)?;
        tracing::debug!(url = %url, "Sending command");

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn fetch(&self, target: &str, resource: &str) -> Result<String, TransportError> {
        let url = self.url(target, resource)?;
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_transport() -> HttpTransport {
        HttpTransport::new(TransportConfig::default()).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.scheme, "http");
        assert_eq!(config.device_port, 5683);
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.sense_resource, "sense");
        assert_eq!(config.observe_interval_ms, 1000);
        assert_eq!(config.status_resource, "status");
        assert_eq!(config.status_poll_interval_ms, 30_000);
    }

    #[test]
    fn test_config_partial_toml() {
        let config: TransportConfig = toml::from_str("device_port = 8080").unwrap();
        assert_eq!(config.device_port, 8080);
        assert_eq!(config.scheme, "http");
    }

    #[test]
    fn test_url_ipv6_bracketed() {
        let transport = create_test_transport();
        assert_eq!(
            transport.url("fd00::1", "a:rgb").unwrap(),
            "http://[fd00::1]:5683/a:rgb"
        );
        assert_eq!(
            transport.url("[fd00::1]", "/sense").unwrap(),
            "http://[fd00::1]:5683/sense"
        );
    }

    #[test]
    fn test_url_ipv4_and_explicit_port() {
        let transport = create_test_transport();
        assert_eq!(
            transport.url("10.0.0.7", "status").unwrap(),
            "http://10.0.0.7:5683/status"
        );
        assert_eq!(
            transport.url("[fd00::1]:9000", "status").unwrap(),
            "http://[fd00::1]:9000/status"
        );
    }

    #[test]
    fn test_url_hostname() {
        let transport = create_test_transport();
        assert_eq!(
            transport.url("node-7.local", "sense").unwrap(),
            "http://node-7.local:5683/sense"
        );
    }

    #[test]
    fn test_url_encodes_path_segments() {
        let transport = create_test_transport();
        assert_eq!(
            transport.url("fd00::1", "a:cfg?x#y").unwrap(),
            "http://[fd00::1]:5683/a:cfg%3Fx%23y"
        );
        assert_eq!(
            transport.url("fd00::1", "/msa/sense").unwrap(),
            "http://[fd00::1]:5683/msa/sense"
        );
        assert_eq!(
            transport.url("fd00::1", "led 1").unwrap(),
            "http://[fd00::1]:5683/led%201"
        );
    }

    #[test]
    fn test_url_rejects_garbage() {
        let transport = create_test_transport();
        assert!(matches!(
            transport.url("", "sense"),
            Err(TransportError::InvalidTarget(_))
        ));
        assert!(matches!(
            transport.url("evil.com/path?x", "sense"),
            Err(TransportError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn test_send_to_unreachable_node_fails() {
        let transport = HttpTransport::new(TransportConfig {
            request_timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();

        // Port 9 (discard) on loopback is closed in test environments
        let result = transport.send("127.0.0.1:9", "a:rgb", "1".to_string()).await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
