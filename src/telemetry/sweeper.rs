//! Staleness Sweeper
//!
//! Periodically re-evaluates node liveness and tells viewers when the
//! active/stale partition changes. Liveness itself is always derived from
//! `last_seen_at`; the sweeper only remembers the previous partition so it
//! can report transitions.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::registry::{Classification, Registry};
use super::types::{now_millis, Timestamp};
use crate::websocket::FanoutEvent;

pub struct StalenessSweeper {
    registry: Arc<Registry>,
    period: Duration,
    previous: Classification,
}

impl StalenessSweeper {
    pub fn new(registry: Arc<Registry>) -> Self {
        let period = Duration::from_millis(registry.config().sweep_interval_ms.max(1));
        Self {
            registry,
            period,
            previous: Classification::default(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one sweep at `now`.
    ///
    /// Returns the new partition when it differs from the previous sweep,
    /// after broadcasting it as a `liveness` event.
    pub fn sweep(&mut self, now: Timestamp) -> Option<Classification> {
        let current = self.registry.classify(now);
        if current == self.previous {
            return None;
        }

        for id in &current.stale {
            if self.previous.stale.binary_search(id).is_err() {
                tracing::info!(node_id = %id, "Node went stale");
            }
        }
        for id in &current.active {
            if self.previous.active.binary_search(id).is_err() {
                tracing::debug!(node_id = %id, "Node active");
            }
        }

        self.registry.fanout().broadcast(FanoutEvent::Liveness {
            at: now,
            classification: current.clone(),
        });
        self.previous = current.clone();
        Some(current)
    }

    /// Start the periodic sweep.
    ///
    /// Each sweep finishes before the next tick is awaited, so sweeps never
    /// overlap. Abort the handle to stop it.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tracing::info!(period_ms = self.period.as_millis() as u64, "Starting staleness sweeper");

        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.sweep(now_millis());
            }
        })
    }
}
