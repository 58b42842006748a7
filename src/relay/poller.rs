//! Status Poller
//!
//! Periodically reads the status resource of every active node and logs
//! the answer. Stale nodes are skipped.

use futures_util::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::transport::Transport;
use crate::telemetry::{now_millis, Registry, Timestamp};

pub struct StatusPoller {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    resource: String,
    period: Duration,
}

impl StatusPoller {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn Transport>,
        resource: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            resource: resource.into(),
            period,
        }
    }

    /// Poll every node active at `now` once. Returns how many answered.
    pub async fn poll_once(&self, now: Timestamp) -> usize {
        let targets = self.registry.active_targets(now);
        if targets.is_empty() {
            return 0;
        }

        let requests = targets.iter().map(|(id, addr)| async move {
            match self.transport.fetch(addr, &self.resource).await {
                Ok(body) => {
                    tracing::info!(node_id = %id, addr = %addr, status = %body, "Status report");
                    true
                }
                Err(e) => {
                    tracing::warn!(node_id = %id, addr = %addr, error = %e, "Status poll failed");
                    false
                }
            }
        });

        join_all(requests).await.into_iter().filter(|ok| *ok).count()
    }

    /// Start polling. Returns `None` when the period is zero.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        if self.period.is_zero() {
            tracing::info!("Status polling disabled");
            return None;
        }
        tracing::info!(period_ms = self.period.as_millis() as u64, "Starting status poller");

        Some(tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Nothing to poll right at startup
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.poll_once(now_millis()).await;
            }
        }))
    }
}
