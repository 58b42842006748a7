//! Node records
//!
//! A `NodeRecord` is the registry's mutable view of one device. Viewers never
//! see it directly; they get a `NodeSnapshot`, an owned copy taken while the
//! record is locked.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{RegistryError, RegistryResult};
use super::history::HistoryBuffer;
use super::types::{NodeId, ReadingBatch, Registration, Sample, Timestamp, Value, ValueShape};

/// One data stream on a node
#[derive(Debug, Clone)]
pub struct Channel {
    /// Fixed by the first reading, never updated afterwards
    unit: String,
    /// Fixed by the first reading, enforced on every push
    shape: ValueShape,
    history: HistoryBuffer,
}

impl Channel {
    pub fn new(unit: impl Into<String>, shape: ValueShape, capacity: usize) -> Self {
        Self {
            unit: unit.into(),
            shape,
            history: HistoryBuffer::new(capacity),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn shape(&self) -> ValueShape {
        self.shape
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Check whether a value fits this channel's layout
    pub fn accepts(&self, value: &Value) -> bool {
        value.shape() == self.shape
    }

    fn push(&mut self, sample: Sample) {
        self.history.push(sample);
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            unit: self.unit.clone(),
            shape: self.shape,
            samples: self.history.to_vec(),
        }
    }
}

/// Everything the registry knows about one device
#[derive(Debug, Clone)]
pub struct NodeRecord {
    id: NodeId,
    first_seen_at: Timestamp,
    last_seen_at: Timestamp,
    source_address: String,
    capabilities: Vec<String>,
    channels: BTreeMap<String, Channel>,
    /// Bumped on every mutation; lets viewers drop updates they already have
    revision: u64,
}

impl NodeRecord {
    pub fn new(id: impl Into<NodeId>, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            first_seen_at: now,
            last_seen_at: now,
            source_address: String::new(),
            capabilities: Vec::new(),
            channels: BTreeMap::new(),
            revision: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn last_seen_at(&self) -> Timestamp {
        self.last_seen_at
    }

    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn channel(&self, key: &str) -> Option<&Channel> {
        self.channels.get(key)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&String, &Channel)> {
        self.channels.iter()
    }

    /// Check a batch against the channels this node already has.
    ///
    /// Nothing is modified; `apply` calls this before touching any state.
    pub fn check(&self, batch: &ReadingBatch) -> RegistryResult<()> {
        for reading in &batch.readings {
            if let Some(channel) = self.channels.get(&reading.channel) {
                if !channel.accepts(&reading.value) {
                    return Err(RegistryError::ShapeMismatch {
                        channel: reading.channel.clone(),
                        expected: channel.shape(),
                        found: reading.value.shape(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply a validated batch: either every reading lands or none does
    pub fn apply(&mut self, batch: ReadingBatch, now: Timestamp, capacity: usize) -> RegistryResult<()> {
        self.check(&batch)?;

        let at = self.touch(batch.source_address, now);
        for reading in batch.readings {
            let shape = reading.value.shape();
            self.channels
                .entry(reading.channel)
                .or_insert_with(|| Channel::new(reading.unit, shape, capacity))
                .push(Sample::new(at, reading.value));
        }
        Ok(())
    }

    /// Apply a bare registration; existing channel data is kept
    pub fn register(&mut self, registration: Registration, now: Timestamp) {
        self.touch(registration.source_address, now);
        self.capabilities = registration.capabilities;
    }

    /// Update liveness fields and the revision together.
    ///
    /// Time never moves backwards for a node, so a wall clock step does not
    /// reorder its history or revive it.
    fn touch(&mut self, source_address: String, now: Timestamp) -> Timestamp {
        let at = now.max(self.last_seen_at);
        self.last_seen_at = at;
        self.source_address = source_address;
        self.revision += 1;
        at
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id.clone(),
            address: self.source_address.clone(),
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
            revision: self.revision,
            capabilities: self.capabilities.clone(),
            channels: self
                .channels
                .iter()
                .map(|(key, channel)| (key.clone(), channel.snapshot()))
                .collect(),
        }
    }
}

/// Owned point-in-time copy of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub address: String,
    pub first_seen_at: Timestamp,
    pub last_seen_at: Timestamp,
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelSnapshot>,
}

/// Owned copy of one channel's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub unit: String,
    pub shape: ValueShape,
    /// Newest first
    pub samples: Vec<Sample>,
}

impl ChannelSnapshot {
    pub fn all(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.first()
    }

    /// Values only, newest first
    pub fn values(&self) -> Vec<Value> {
        self.samples.iter().map(|s| s.value.clone()).collect()
    }
}
