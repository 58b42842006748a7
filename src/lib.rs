//! # Sensorhub
//!
//! IoT device registry and telemetry relay. Sensor and actuator nodes push
//! SenML readings; sensorhub tracks which nodes are alive, keeps a bounded
//! history per channel, streams every change to live dashboards and relays
//! dashboard commands back to the nodes.
//!
//! ## Features
//!
//! - **Registry**: One record per node, per-node locking, atomic batches
//! - **Bounded history**: Newest-first ring of the last samples per channel
//! - **Derived liveness**: Active/stale computed from last ingestion time
//! - **Real-time**: WebSocket viewers get a snapshot, then ordered updates
//! - **Command relay**: Fire-and-forget commands to node endpoints
//!
//! ## Modules
//!
//! - [`telemetry`]: Registry, history and liveness
//! - [`websocket`]: Viewer fan-out and socket handling
//! - [`relay`]: Transport seam, command relay and status polling
//! - [`api`]: Device endpoints and REST API with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust
//! use sensorhub::telemetry::{ReadingBatch, Registry, RegistryConfig};
//! use sensorhub::websocket::{EventFanout, FanoutConfig};
//! use std::sync::Arc;
//!
//! let fanout = Arc::new(EventFanout::new(FanoutConfig::default()));
//! let registry = Registry::new(RegistryConfig::default(), fanout);
//!
//! registry
//!     .ingest(
//!         ReadingBatch::new("urn:dev:mac:aed80806cc34", "fd00::1")
//!             .reading("s:acc", "g", vec![0.0, 0.0, 1.0])
//!             .reading("s:temp", "Cel", 21.5),
//!     )
//!     .unwrap();
//!
//! let snapshot = registry.snapshot();
//! let node = snapshot.get("urn:dev:mac:aed80806cc34").unwrap();
//! assert_eq!(node.channels.len(), 2);
//! ```

pub mod api;
pub mod config;
pub mod relay;
pub mod telemetry;
pub mod websocket;

// Re-export top-level types for convenience
pub use telemetry::{
    Classification, Liveness, NodeId, NodeSnapshot, ReadingBatch, Registration, Registry,
    RegistryConfig, RegistryError, RegistryResult, Snapshot, StalenessSweeper, Timestamp, Value,
};

pub use relay::{
    Command, CommandRelay, HttpTransport, RelayError, SenseObserver, StatusPoller, Transport,
    TransportConfig, TransportError,
};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use websocket::{
    websocket_handler, ClientMessage, EventFanout, FanoutConfig, FanoutError, FanoutEvent,
    ViewerMessage, ViewerSession,
};

pub use config::{Config, ConfigError, LoggingConfig};
