//! Node Registry
//!
//! Owns the NodeId → NodeRecord mapping and is the single writer for it.
//!
//! - Write path: batch → validate → per-node lock → apply → fan-out `update`
//! - Read path: map read lock → per-node lock → owned snapshot
//!
//! The map itself is only write-locked to insert a node that has never been
//! seen. Every other mutation holds the map read lock just long enough to
//! clone the node's slot, then locks that node alone, so ingests for
//! different nodes do not wait on each other.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::error::{RegistryError, RegistryResult};
use super::history::DATA_HISTORY;
use super::node::{NodeRecord, NodeSnapshot};
use super::types::{now_millis, NodeId, ReadingBatch, Registration, Timestamp};
use crate::websocket::{EventFanout, FanoutEvent};

/// Time without ingestion after which a node counts as stale (ms)
pub const STALE_TIME_MS: i64 = 2000;

/// How often the sweeper re-evaluates liveness (ms)
pub const DB_UPDATE_INTERVAL_MS: u64 = 500;

/// Registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Samples retained per channel
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Staleness threshold in milliseconds
    #[serde(default = "default_stale_time")]
    pub stale_time_ms: i64,
    /// Sweeper period in milliseconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

fn default_history_capacity() -> usize {
    DATA_HISTORY
}

fn default_stale_time() -> i64 {
    STALE_TIME_MS
}

fn default_sweep_interval() -> u64 {
    DB_UPDATE_INTERVAL_MS
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            stale_time_ms: default_stale_time(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

/// Liveness of a node, derived from its last ingestion time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Active,
    Stale,
}

impl Liveness {
    /// A node is active iff `now - last_seen_at < stale_time_ms`
    pub fn at(last_seen_at: Timestamp, now: Timestamp, stale_time_ms: i64) -> Self {
        if now.saturating_sub(last_seen_at) < stale_time_ms {
            Liveness::Active
        } else {
            Liveness::Stale
        }
    }
}

/// Total, disjoint partition of known nodes by liveness. Both lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub active: Vec<NodeId>,
    pub stale: Vec<NodeId>,
}

impl Classification {
    /// Liveness of a node in this partition, if it is known
    pub fn of(&self, id: &str) -> Option<Liveness> {
        if self.active.binary_search_by(|n| n.as_str().cmp(id)).is_ok() {
            Some(Liveness::Active)
        } else if self.stale.binary_search_by(|n| n.as_str().cmp(id)).is_ok() {
            Some(Liveness::Stale)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.stale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable point-in-time copy of every node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: Timestamp,
    pub nodes: BTreeMap<NodeId, NodeSnapshot>,
}

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Partition implied by this snapshot at the moment it was taken
    pub fn classify(&self, stale_time_ms: i64) -> Classification {
        let mut classification = Classification::default();
        // BTreeMap order keeps both lists sorted
        for (id, node) in &self.nodes {
            match Liveness::at(node.last_seen_at, self.taken_at, stale_time_ms) {
                Liveness::Active => classification.active.push(id.clone()),
                Liveness::Stale => classification.stale.push(id.clone()),
            }
        }
        classification
    }
}

type Slot = Arc<Mutex<NodeRecord>>;

/// The node registry
pub struct Registry {
    nodes: RwLock<HashMap<NodeId, Slot>>,
    fanout: Arc<EventFanout>,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(config: RegistryConfig, fanout: Arc<EventFanout>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            fanout,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Fan-out that receives an `update` after every mutation
    pub fn fanout(&self) -> &Arc<EventFanout> {
        &self.fanout
    }

    /// Ingest a batch of readings stamped with the current time
    pub fn ingest(&self, batch: ReadingBatch) -> RegistryResult<()> {
        self.ingest_at(batch, now_millis())
    }

    /// Ingest a batch of readings stamped with `now`.
    ///
    /// The whole batch is validated before any state changes; a rejected
    /// batch never creates a node.
    pub fn ingest_at(&self, batch: ReadingBatch, now: Timestamp) -> RegistryResult<()> {
        batch.validate()?;

        let node_id = batch.node_id.clone();
        let readings = batch.readings.len();
        let capacity = self.config.history_capacity;
        let created = self.upsert(&node_id, now, |record| record.apply(batch, now, capacity))?;

        if created {
            tracing::info!(node_id = %node_id, "New node");
        }
        tracing::debug!(node_id = %node_id, readings, "Ingested readings");
        Ok(())
    }

    /// Record a bare registration stamped with the current time.
    ///
    /// Returns true when the node was not known before. The caller is
    /// expected to subscribe to the node's sense resource afterwards.
    pub fn register(&self, registration: Registration) -> RegistryResult<bool> {
        self.register_at(registration, now_millis())
    }

    pub fn register_at(&self, registration: Registration, now: Timestamp) -> RegistryResult<bool> {
        registration.validate()?;

        let node_id = registration.node_id.clone();
        let created = self.upsert(&node_id, now, |record| {
            record.register(registration, now);
            Ok(())
        })?;

        tracing::info!(node_id = %node_id, created, "Node registered");
        Ok(created)
    }

    /// Copy of every node, safe to hand to a viewer
    pub fn snapshot(&self) -> Snapshot {
        let nodes = self.nodes.read();
        let copies = nodes
            .iter()
            .map(|(id, slot)| (id.clone(), slot.lock().snapshot()))
            .collect();
        Snapshot {
            taken_at: now_millis(),
            nodes: copies,
        }
    }

    /// Copy of a single node
    pub fn node(&self, id: &str) -> Option<NodeSnapshot> {
        self.slot(id).map(|slot| slot.lock().snapshot())
    }

    /// Last address a node reported from
    pub fn address_of(&self, id: &str) -> RegistryResult<String> {
        self.slot(id)
            .map(|slot| slot.lock().source_address().to_string())
            .ok_or_else(|| RegistryError::UnknownNode(id.to_string()))
    }

    /// Partition every known node into active and stale at `now`
    pub fn classify(&self, now: Timestamp) -> Classification {
        let stale_time = self.config.stale_time_ms;
        let mut classification = Classification::default();

        for (id, slot) in self.nodes.read().iter() {
            let last_seen = slot.lock().last_seen_at();
            match Liveness::at(last_seen, now, stale_time) {
                Liveness::Active => classification.active.push(id.clone()),
                Liveness::Stale => classification.stale.push(id.clone()),
            }
        }

        classification.active.sort();
        classification.stale.sort();
        classification
    }

    pub fn liveness_of(&self, id: &str, now: Timestamp) -> Option<Liveness> {
        self.slot(id)
            .map(|slot| Liveness::at(slot.lock().last_seen_at(), now, self.config.stale_time_ms))
    }

    /// (id, address) of every node that is active at `now`, sorted by id
    pub fn active_targets(&self, now: Timestamp) -> Vec<(NodeId, String)> {
        let stale_time = self.config.stale_time_ms;
        let mut targets: Vec<_> = self
            .nodes
            .read()
            .iter()
            .filter_map(|(id, slot)| {
                let record = slot.lock();
                (Liveness::at(record.last_seen_at(), now, stale_time) == Liveness::Active
                    && !record.source_address().is_empty())
                .then(|| (id.clone(), record.source_address().to_string()))
            })
            .collect();
        targets.sort();
        targets
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn slot(&self, id: &str) -> Option<Slot> {
        self.nodes.read().get(id).cloned()
    }

    /// Mutate an existing node, or build and insert a new one.
    ///
    /// A new record is fully populated before it is inserted, so no reader
    /// ever sees a node without its first readings. The `update` event is
    /// sent while the node is still locked, keeping per-node events in
    /// revision order.
    fn upsert<F>(&self, id: &str, now: Timestamp, mutate: F) -> RegistryResult<bool>
    where
        F: FnOnce(&mut NodeRecord) -> RegistryResult<()>,
    {
        if let Some(slot) = self.slot(id) {
            self.mutate_existing(&slot, mutate)?;
            return Ok(false);
        }

        let mut nodes = self.nodes.write();
        match nodes.entry(id.to_string()) {
            Entry::Occupied(entry) => {
                let slot = Arc::clone(entry.get());
                drop(nodes);
                self.mutate_existing(&slot, mutate)?;
                Ok(false)
            }
            Entry::Vacant(entry) => {
                let mut record = NodeRecord::new(id, now);
                mutate(&mut record)?;
                let snapshot = record.snapshot();
                entry.insert(Arc::new(Mutex::new(record)));
                self.fanout.broadcast(FanoutEvent::update(snapshot));
                Ok(true)
            }
        }
    }

    fn mutate_existing<F>(&self, slot: &Slot, mutate: F) -> RegistryResult<()>
    where
        F: FnOnce(&mut NodeRecord) -> RegistryResult<()>,
    {
        let mut record = slot.lock();
        mutate(&mut *record)?;
        self.fanout.broadcast(FanoutEvent::update(record.snapshot()));
        Ok(())
    }
}
