//! Telemetry Registry
//!
//! The core of sensorhub: per-node records, bounded channel history and
//! derived liveness.
//!
//! - **types**: Values, samples and decoded payloads
//! - **history**: Fixed-capacity, newest-first sample ring
//! - **node**: Per-node record and its owned snapshot
//! - **registry**: NodeId → NodeRecord map, ingestion, snapshot, classify
//! - **sweeper**: Periodic liveness re-evaluation
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Ingest:
//!   ReadingBatch → validate → lock node → apply → EventFanout (update)
//!
//! Viewer connect:
//!   subscribe to EventFanout → Registry::snapshot() → init, then updates
//! ```
//!
//! # Example
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
//!     .ingest(ReadingBatch::new("urn:dev:mac:0103fa34d4e5", "fd00::1").reading("s:temp", "Cel", 21.5))
//!     .unwrap();
//!
//! let now = sensorhub::telemetry::now_millis();
//! assert_eq!(registry.classify(now).active.len(), 1);
//! ```

pub mod error;
pub mod history;
pub mod node;
pub mod registry;
pub mod sweeper;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use history::{HistoryBuffer, DATA_HISTORY};
pub use node::{Channel, ChannelSnapshot, NodeRecord, NodeSnapshot};
pub use registry::{
    Classification, Liveness, Registry, RegistryConfig, Snapshot, DB_UPDATE_INTERVAL_MS,
    STALE_TIME_MS,
};
pub use sweeper::StalenessSweeper;
pub use types::{
    now_millis, NodeId, Reading, ReadingBatch, Registration, Sample, Timestamp, Value, ValueShape,
};
