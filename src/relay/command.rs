//! Command Relay
//!
//! Forwards operator commands to nodes. Sends are fire-and-forget: the
//! request is handed to a spawned task and its outcome is only logged, so
//! delivery failures never reach the caller.

use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use super::observer::{SenseObserver, OBSERVE_INTERVAL_MS};
use super::transport::Transport;
use crate::telemetry::{Registry, RegistryError};

/// Errors from the command relay
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl From<RegistryError> for RelayError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownNode(id) => RelayError::UnknownNode(id),
            other => RelayError::InvalidCommand(other.to_string()),
        }
    }
}

/// A command addressed to one endpoint of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub addr: String,
    pub ep: String,
    pub val: String,
}

impl Command {
    pub fn new(
        addr: impl Into<String>,
        ep: impl Into<String>,
        val: impl Into<String>,
    ) -> Result<Self, RelayError> {
        let command = Self {
            addr: addr.into(),
            ep: ep.into(),
            val: val.into(),
        };
        command.validate()?;
        Ok(command)
    }

    /// Build a command from a JSON payload value.
    ///
    /// Strings are sent verbatim; numbers, booleans and other JSON are sent
    /// as their JSON text.
    pub fn from_json(
        addr: impl Into<String>,
        ep: impl Into<String>,
        val: &serde_json::Value,
    ) -> Result<Self, RelayError> {
        let val = match val {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => {
                return Err(RelayError::InvalidCommand("missing value".to_string()))
            }
            other => other.to_string(),
        };
        Self::new(addr, ep, val)
    }

    fn validate(&self) -> Result<(), RelayError> {
        if self.addr.trim().is_empty() {
            return Err(RelayError::InvalidCommand("empty address".to_string()));
        }
        if self.ep.trim().trim_start_matches('/').is_empty() {
            return Err(RelayError::InvalidCommand("empty endpoint".to_string()));
        }
        Ok(())
    }
}

/// Sends commands and observation requests through a `Transport`
#[derive(Clone)]
pub struct CommandRelay {
    transport: Arc<dyn Transport>,
    observer: SenseObserver,
}

impl CommandRelay {
    pub fn new(transport: Arc<dyn Transport>, sense_resource: impl Into<String>) -> Self {
        let observer = SenseObserver::new(
            Arc::clone(&transport),
            sense_resource,
            Duration::from_millis(OBSERVE_INTERVAL_MS),
        );
        Self { transport, observer }
    }

    /// Re-read period for sense observations; zero reads once
    pub fn with_observe_interval(mut self, period: Duration) -> Self {
        self.observer = SenseObserver::new(
            Arc::clone(&self.transport),
            self.observer.resource().to_string(),
            period,
        );
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn observer(&self) -> &SenseObserver {
        &self.observer
    }

    /// Hand a command to the transport without waiting for the node.
    ///
    /// Failures are logged. The handle is only useful to tests.
    pub fn send(&self, command: Command) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        tracing::info!(addr = %command.addr, ep = %command.ep, "Relaying command");

        tokio::spawn(async move {
            let Command { addr, ep, val } = command;
            if let Err(e) = transport.send(&addr, &ep, val).await {
                tracing::warn!(addr = %addr, ep = %ep, error = %e, "Command delivery failed");
            }
        })
    }

    /// Send to a node by id, using the address it last reported from
    pub fn send_to_node(
        &self,
        registry: &Registry,
        node_id: &str,
        ep: &str,
        val: &serde_json::Value,
    ) -> Result<Command, RelayError> {
        let addr = registry.address_of(node_id)?;
        let command = Command::from_json(addr, ep, val)?;
        self.send(command.clone());
        Ok(command)
    }

    /// Observe a freshly registered node's sense resource.
    ///
    /// Returns `None` when the node is already observed.
    pub fn observe(
        &self,
        registry: &Arc<Registry>,
        node_id: &str,
        addr: &str,
    ) -> Option<JoinHandle<()>> {
        self.observer.observe(Arc::clone(registry), node_id, addr)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::relay::transport::TransportError;
    use crate::telemetry::{ReadingBatch, Registration, RegistryConfig};
    use crate::websocket::{EventFanout, FanoutConfig};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every request instead of touching the network
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Mutex<Vec<(String, String, String)>>,
        pub fetched: Mutex<Vec<(String, String)>>,
        pub fail: bool,
        /// Answer to every fetch; `{"ok":true}` when unset
        pub body: Option<String>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(
            &self,
            target: &str,
            endpoint: &str,
            payload: String,
        ) -> Result<(), TransportError> {
            self.sent
                .lock()
                .push((target.to_string(), endpoint.to_string(), payload));
            if self.fail {
                return Err(TransportError::Status(500));
            }
            Ok(())
        }

        async fn fetch(&self, target: &str, resource: &str) -> Result<String, TransportError> {
            self.fetched
                .lock()
                .push((target.to_string(), resource.to_string()));
            if self.fail {
                return Err(TransportError::Request("unreachable".to_string()));
            }
            Ok(self
                .body
                .clone()
                .unwrap_or_else(|| r#"{"ok":true}"#.to_string()))
        }
    }

    fn create_test_relay() -> (Arc<RecordingTransport>, CommandRelay) {
        let transport = Arc::new(RecordingTransport::default());
        let relay = CommandRelay::new(transport.clone(), "sense");
        (transport, relay)
    }

    #[test]
    fn test_command_from_json() {
        let string = Command::from_json("fd00::1", "a:rgb", &serde_json::json!("255,0,0")).unwrap();
        assert_eq!(string.val, "255,0,0");

        let number = Command::from_json("fd00::1", "a:mode", &serde_json::json!(1)).unwrap();
        assert_eq!(number.val, "1");

        let object =
            Command::from_json("fd00::1", "a:cfg", &serde_json::json!({"on": true})).unwrap();
        assert_eq!(object.val, r#"{"on":true}"#);
    }

    #[test]
    fn test_command_validation() {
        assert!(matches!(
            Command::new("", "a:rgb", "1"),
            Err(RelayError::InvalidCommand(_))
        ));
        assert!(matches!(
            Command::new("fd00::1", "/", "1"),
            Err(RelayError::InvalidCommand(_))
        ));
        assert!(matches!(
            Command::from_json("fd00::1", "a:rgb", &serde_json::Value::Null),
            Err(RelayError::InvalidCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_send_reaches_transport() {
        let (transport, relay) = create_test_relay();
        let command = Command::new("fd00::1", "a:rgb", "255,0,0").unwrap();

        relay.send(command).await.unwrap();

        let sent = transport.sent.lock();
        assert_eq!(
            *sent,
            vec![(
                "fd00::1".to_string(),
                "a:rgb".to_string(),
                "255,0,0".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let relay = CommandRelay::new(transport.clone(), "sense");

        let handle = relay.send(Command::new("fd00::1", "a:rgb", "1").unwrap());
        assert!(handle.await.is_ok());
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_send_to_node_resolves_address() {
        let (transport, relay) = create_test_relay();
        let registry = Registry::new(
            RegistryConfig::default(),
            Arc::new(EventFanout::new(FanoutConfig::default())),
        );
        registry
            .ingest(ReadingBatch::new("urn:dev:x", "fd00::9").reading("s:temp", "Cel", 20.0))
            .unwrap();

        let command = relay
            .send_to_node(&registry, "urn:dev:x", "a:led", &serde_json::json!("on"))
            .unwrap();
        assert_eq!(command.addr, "fd00::9");

        let unknown = relay.send_to_node(&registry, "ghost", "a:led", &serde_json::json!("on"));
        assert!(matches!(unknown, Err(RelayError::UnknownNode(id)) if id == "ghost"));

        // The send itself is spawned; give it a chance to run
        for _ in 0..10 {
            if !transport.sent.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_observe_fetches_sense_resource() {
        let (transport, relay) = create_test_relay();
        let relay = relay.with_observe_interval(Duration::ZERO);
        let registry = Arc::new(Registry::new(
            RegistryConfig::default(),
            Arc::new(EventFanout::new(FanoutConfig::default())),
        ));
        registry
            .register(Registration::new("urn:dev:x", "fd00::3", vec![]))
            .unwrap();

        relay
            .observe(&registry, "urn:dev:x", "fd00::3")
            .unwrap()
            .await
            .unwrap();

        assert_eq!(
            *transport.fetched.lock(),
            vec![("fd00::3".to_string(), "sense".to_string())]
        );
        assert!(!relay.observer().is_observing("urn:dev:x"));
    }
}
