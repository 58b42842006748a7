//! Viewer Fan-out Hub
//!
//! Delivers registry events to every connected viewer.
//! Uses a bounded tokio broadcast channel, so sending never blocks ingestion;
//! a viewer that falls too far behind is resynchronised with a fresh
//! snapshot instead.

use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use uuid::Uuid;

use super::messages::{FanoutEvent, ViewerMessage};
use crate::telemetry::{now_millis, Classification, NodeId, Registry, Snapshot, Timestamp};

/// Unique identifier for a viewer connection
pub type ViewerId = String;

/// Configuration for the fan-out hub
#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    /// Maximum number of concurrent viewers
    #[serde(default = "default_max_viewers")]
    pub max_viewers: usize,
    /// Events buffered per viewer before it counts as lagging
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_max_viewers() -> usize {
    1000
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_viewers: default_max_viewers(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Broadcasts registry events to all connected viewers
pub struct EventFanout {
    /// Connected viewers: ViewerId → connect time
    viewers: RwLock<HashMap<ViewerId, Timestamp>>,
    broadcast_tx: broadcast::Sender<FanoutEvent>,
    config: FanoutConfig,
}

impl EventFanout {
    pub fn new(config: FanoutConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.channel_capacity.max(1));

        Self {
            viewers: RwLock::new(HashMap::new()),
            broadcast_tx,
            config,
        }
    }

    /// Register a viewer and start receiving events.
    ///
    /// Fails once `max_viewers` are connected. The viewer is unregistered
    /// when the returned `Subscription` is dropped.
    pub fn subscribe(self: &Arc<Self>) -> Result<Subscription, FanoutError> {
        let mut viewers = self.viewers.write();
        if viewers.len() >= self.config.max_viewers {
            return Err(FanoutError::TooManyViewers(self.config.max_viewers));
        }

        let id = Uuid::new_v4().to_string();
        viewers.insert(id.clone(), now_millis());
        let receiver = self.broadcast_tx.subscribe();
        drop(viewers);

        tracing::info!(viewer_id = %id, "Viewer connected");
        Ok(Subscription {
            id,
            receiver,
            fanout: Arc::clone(self),
        })
    }

    /// Remove a viewer
    pub fn unsubscribe(&self, id: &str) {
        if self.viewers.write().remove(id).is_some() {
            tracing::info!(viewer_id = %id, "Viewer disconnected");
        }
    }

    /// Deliver an event to every subscribed viewer.
    ///
    /// Never blocks. Returns the number of viewers the event was queued for.
    pub fn broadcast(&self, event: FanoutEvent) -> usize {
        match self.broadcast_tx.send(event) {
            Ok(receivers) => {
                tracing::trace!(receivers, "Broadcast event");
                receivers
            }
            // No viewers connected
            Err(_) => 0,
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.read().len()
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }
}

/// A viewer's registration with the hub plus its event receiver
pub struct Subscription {
    id: ViewerId,
    receiver: broadcast::Receiver<FanoutEvent>,
    fanout: Arc<EventFanout>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next event
    pub async fn recv(&mut self) -> Result<FanoutEvent, RecvError> {
        self.receiver.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<FanoutEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(viewer_id = %self.id, skipped, "Viewer lagged");
                self.receiver.try_recv().ok()
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.fanout.unsubscribe(&self.id);
    }
}

/// One viewer's ordered view of the registry: a snapshot, then updates.
///
/// The session subscribes before it takes its snapshot and drops every
/// update whose revision it has already delivered, so an ingest that races
/// the connect shows up exactly once.
///
/// A `liveness` event only signals that the partition changed. The session
/// answers it with the partition as of now, and only when that differs from
/// what the viewer already has, so a sweep queued before the snapshot can
/// never roll the viewer back.
pub struct ViewerSession {
    registry: Arc<Registry>,
    subscription: Subscription,
    /// Highest revision delivered per node
    delivered: HashMap<NodeId, u64>,
    /// Partition the viewer was last told about
    liveness: Classification,
}

impl ViewerSession {
    /// Connect a viewer. Returns the session and the `init` message that
    /// must be sent before anything from `next`.
    pub fn open(registry: Arc<Registry>) -> Result<(Self, ViewerMessage), FanoutError> {
        let subscription = registry.fanout().subscribe()?;
        let snapshot = registry.snapshot();

        let mut session = Self {
            registry,
            subscription,
            delivered: HashMap::new(),
            liveness: Classification::default(),
        };
        let init = session.reset(snapshot);
        Ok((session, init))
    }

    pub fn id(&self) -> &str {
        self.subscription.id()
    }

    /// Wait for the next message for this viewer.
    ///
    /// Returns `None` once the hub is gone. Cancel safe.
    pub async fn next(&mut self) -> Option<ViewerMessage> {
        loop {
            match self.subscription.recv().await {
                Ok(FanoutEvent::Update(node)) => {
                    let seen = self.delivered.get(&node.id).copied().unwrap_or(0);
                    if node.revision <= seen {
                        continue;
                    }
                    self.delivered.insert(node.id.clone(), node.revision);
                    return Some(FanoutEvent::Update(node).into());
                }
                Ok(FanoutEvent::Liveness { .. }) => {
                    let at = now_millis();
                    let current = self.registry.classify(at);
                    if current == self.liveness {
                        continue;
                    }
                    self.liveness = current.clone();
                    return Some(ViewerMessage::liveness(at, current));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        viewer_id = %self.id(),
                        skipped,
                        "Viewer lagged, resending snapshot"
                    );
                    let snapshot = self.registry.snapshot();
                    return Some(self.reset(snapshot));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn reset(&mut self, snapshot: Snapshot) -> ViewerMessage {
        self.delivered = snapshot
            .nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.revision))
            .collect();
        self.liveness = snapshot.classify(self.registry.config().stale_time_ms);
        ViewerMessage::init(snapshot, self.liveness.clone())
    }
}

/// Errors that can occur in the fan-out hub
#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("Too many viewers (limit: {0})")]
    TooManyViewers(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Liveness, ReadingBatch, RegistryConfig, StalenessSweeper};

    fn create_test_registry(config: FanoutConfig) -> Arc<Registry> {
        let fanout = Arc::new(EventFanout::new(config));
        Arc::new(Registry::new(RegistryConfig::default(), fanout))
    }

    fn ingest(registry: &Registry, id: &str, value: f64) {
        registry
            .ingest(ReadingBatch::new(id, "fd00::1").reading("s:temp", "Cel", value))
            .unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = FanoutConfig::default();
        assert_eq!(config.max_viewers, 1000);
        assert_eq!(config.channel_capacity, 1024);
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let fanout = Arc::new(EventFanout::new(FanoutConfig::default()));

        let subscription = fanout.subscribe().unwrap();
        assert!(!subscription.id().is_empty());
        assert_eq!(fanout.viewer_count(), 1);

        drop(subscription);
        assert_eq!(fanout.viewer_count(), 0);
    }

    #[test]
    fn test_viewer_limit() {
        let fanout = Arc::new(EventFanout::new(FanoutConfig {
            max_viewers: 2,
            channel_capacity: 16,
        }));

        let _s1 = fanout.subscribe().unwrap();
        let _s2 = fanout.subscribe().unwrap();
        let result = fanout.subscribe();

        assert!(matches!(result, Err(FanoutError::TooManyViewers(2))));
    }

    #[test]
    fn test_broadcast_without_viewers() {
        let fanout = EventFanout::new(FanoutConfig::default());
        let event = FanoutEvent::Liveness {
            at: 0,
            classification: Default::default(),
        };
        assert_eq!(fanout.broadcast(event), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_viewer() {
        let fanout = Arc::new(EventFanout::new(FanoutConfig::default()));
        let mut s1 = fanout.subscribe().unwrap();
        let mut s2 = fanout.subscribe().unwrap();

        let delivered = fanout.broadcast(FanoutEvent::Liveness {
            at: 7,
            classification: Default::default(),
        });
        assert_eq!(delivered, 2);

        assert!(matches!(s1.recv().await, Ok(FanoutEvent::Liveness { at: 7, .. })));
        assert!(matches!(s2.recv().await, Ok(FanoutEvent::Liveness { at: 7, .. })));
    }

    #[tokio::test]
    async fn test_scenario_e_connect_sees_existing_nodes() {
        let registry = create_test_registry(FanoutConfig::default());
        ingest(&registry, "a", 1.0);
        ingest(&registry, "b", 1.0);
        ingest(&registry, "c", 1.0);

        let (mut session, init) = ViewerSession::open(Arc::clone(&registry)).unwrap();
        match init {
            ViewerMessage::Init { nodes, .. } => {
                assert_eq!(nodes.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
            }
            other => panic!("Expected Init, got {:?}", other),
        }

        // A fourth node after connect arrives as a broadcast
        ingest(&registry, "d", 1.0);
        match session.next().await.unwrap() {
            ViewerMessage::Update { id, node } => {
                assert_eq!(id, "d");
                assert_eq!(node.revision, 1);
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_racing_update_not_double_counted() {
        let registry = create_test_registry(FanoutConfig::default());
        ingest(&registry, "a", 1.0);

        // Subscribe first, then let an ingest land before the snapshot is
        // taken: it is in both the channel and the snapshot.
        let subscription = registry.fanout().subscribe().unwrap();
        ingest(&registry, "a", 2.0);
        let snapshot = registry.snapshot();
        let mut session = ViewerSession {
            registry: Arc::clone(&registry),
            subscription,
            delivered: HashMap::new(),
            liveness: Classification::default(),
        };
        let init = session.reset(snapshot);
        assert!(matches!(init, ViewerMessage::Init { .. }));

        ingest(&registry, "a", 3.0);

        // The revision-2 broadcast is skipped, revision 3 comes through
        match session.next().await.unwrap() {
            ViewerMessage::Update { node, .. } => assert_eq!(node.revision, 3),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_liveness_older_than_snapshot_dropped() {
        let registry = create_test_registry(FanoutConfig::default());
        let mut sweeper = StalenessSweeper::new(Arc::clone(&registry));
        let now = now_millis();
        registry
            .ingest_at(
                ReadingBatch::new("x", "fd00::1").reading("s:temp", "Cel", 1.0),
                now - 10_000,
            )
            .unwrap();

        // A sweep marking x stale is queued, then x reports again, all
        // before the snapshot is taken
        let subscription = registry.fanout().subscribe().unwrap();
        assert!(sweeper.sweep(now).is_some());
        ingest(&registry, "x", 2.0);
        let snapshot = registry.snapshot();
        let mut session = ViewerSession {
            registry: Arc::clone(&registry),
            subscription,
            delivered: HashMap::new(),
            liveness: Classification::default(),
        };

        match session.reset(snapshot) {
            ViewerMessage::Init { active, stale, .. } => {
                assert_eq!(active, vec!["x"]);
                assert!(stale.is_empty());
            }
            other => panic!("Expected Init, got {:?}", other),
        }

        // Neither the stale partition nor the covered update comes through
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(50), session.next()).await;
        assert!(pending.is_err());
        assert_eq!(registry.liveness_of("x", now_millis()), Some(Liveness::Active));
    }

    #[tokio::test]
    async fn test_liveness_change_after_connect_delivered() {
        let registry = create_test_registry(FanoutConfig::default());
        let mut sweeper = StalenessSweeper::new(Arc::clone(&registry));
        let (mut session, _init) = ViewerSession::open(Arc::clone(&registry)).unwrap();

        registry
            .ingest_at(
                ReadingBatch::new("x", "fd00::1").reading("s:temp", "Cel", 1.0),
                now_millis() - 10_000,
            )
            .unwrap();
        assert!(matches!(session.next().await, Some(ViewerMessage::Update { .. })));

        assert!(sweeper.sweep(now_millis()).is_some());
        match session.next().await.unwrap() {
            ViewerMessage::Liveness { active, stale, .. } => {
                assert!(active.is_empty());
                assert_eq!(stale, vec!["x"]);
            }
            other => panic!("Expected Liveness, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lagging_viewer_gets_fresh_snapshot() {
        let registry = create_test_registry(FanoutConfig {
            max_viewers: 10,
            channel_capacity: 2,
        });
        let (mut session, _init) = ViewerSession::open(Arc::clone(&registry)).unwrap();

        for i in 0..10 {
            ingest(&registry, "a", i as f64);
        }

        match session.next().await.unwrap() {
            ViewerMessage::Init { nodes, .. } => {
                assert_eq!(nodes["a"].revision, 10);
            }
            other => panic!("Expected Init, got {:?}", other),
        }

        // Whatever is still queued is covered by the resync and gets dropped
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(50), session.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_session_drop_unregisters() {
        let registry = create_test_registry(FanoutConfig::default());
        let (session, _init) = ViewerSession::open(Arc::clone(&registry)).unwrap();
        assert_eq!(registry.fanout().viewer_count(), 1);

        drop(session);
        assert_eq!(registry.fanout().viewer_count(), 0);
    }
}
