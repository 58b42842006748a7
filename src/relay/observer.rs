//! Sense Observation
//!
//! A registered node is observed on its sense resource. Over HTTP a node
//! cannot push notifications down a GET, so an observation re-reads the
//! resource on a fixed period for as long as the node stays active. Each
//! answer is a notification: a SenML pack is ingested as if the node had
//! pushed it, anything else is logged.
//!
//! Best-effort: a failed read ends the observation and it is not retried.
//! The next registration starts a new one.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::transport::{Transport, TransportError};
use crate::api::dto::decode_senml;
use crate::telemetry::{now_millis, Liveness, NodeId, Registry};

/// Default observation period (ms)
pub const OBSERVE_INTERVAL_MS: u64 = 1000;

/// What became of one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// A SenML pack with this many readings was ingested
    Ingested(usize),
    /// A SenML pack the registry refused
    Rejected,
    /// Not SenML; logged only
    Logged,
}

/// Runs at most one observation per node
#[derive(Clone)]
pub struct SenseObserver {
    transport: Arc<dyn Transport>,
    resource: String,
    period: Duration,
    observing: Arc<Mutex<HashSet<NodeId>>>,
}

impl SenseObserver {
    /// A zero `period` reads the resource once per registration
    pub fn new(transport: Arc<dyn Transport>, resource: impl Into<String>, period: Duration) -> Self {
        Self {
            transport,
            resource: resource.into(),
            period,
            observing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_observing(&self, node_id: &str) -> bool {
        self.observing.lock().contains(node_id)
    }

    /// Start observing `node_id` at `addr`.
    ///
    /// Returns `None` when the node is already being observed.
    pub fn observe(&self, registry: Arc<Registry>, node_id: &str, addr: &str) -> Option<JoinHandle<()>> {
        if !self.observing.lock().insert(node_id.to_string()) {
            tracing::debug!(node_id = %node_id, "Already observing");
            return None;
        }
        let guard = Observing {
            observing: Arc::clone(&self.observing),
            node_id: node_id.to_string(),
        };

        tracing::info!(node_id = %node_id, addr = %addr, resource = %self.resource, "Observing node");
        let observer = self.clone();
        let addr = addr.to_string();
        Some(tokio::spawn(async move {
            observer.run(&registry, &guard.node_id, &addr).await;
            drop(guard);
        }))
    }

    async fn run(&self, registry: &Registry, node_id: &str, addr: &str) {
        let mut ticker = interval(self.period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.notify(registry, node_id, addr).await {
                tracing::warn!(node_id = %node_id, addr = %addr, error = %e, "Observation ended");
                return;
            }
            if self.period.is_zero() {
                return;
            }
            if registry.liveness_of(node_id, now_millis()) != Some(Liveness::Active) {
                tracing::info!(node_id = %node_id, "Node stale, observation ended");
                return;
            }
        }
    }

    /// Read the sense resource once and hand the answer to the registry
    pub async fn notify(
        &self,
        registry: &Registry,
        node_id: &str,
        addr: &str,
    ) -> Result<Notification, TransportError> {
        let body = self.transport.fetch(addr, &self.resource).await?;

        let batch = match decode_senml(body.as_bytes(), addr) {
            Ok(batch) if !batch.readings.is_empty() => batch,
            _ => {
                tracing::info!(node_id = %node_id, addr = %addr, data = %body.trim(), "Sense notification");
                return Ok(Notification::Logged);
            }
        };

        let readings = batch.readings.len();
        match registry.ingest(batch) {
            Ok(()) => {
                tracing::info!(node_id = %node_id, addr = %addr, readings, "Sense notification");
                Ok(Notification::Ingested(readings))
            }
            Err(e) => {
                tracing::warn!(node_id = %node_id, addr = %addr, error = %e, "Sense notification rejected");
                Ok(Notification::Rejected)
            }
        }
    }
}

/// Marks a node as observed until dropped, including on abort
struct Observing {
    observing: Arc<Mutex<HashSet<NodeId>>>,
    node_id: NodeId,
}

impl Drop for Observing {
    fn drop(&mut self) {
        self.observing.lock().remove(&self.node_id);
    }
}
