//! Broadcast coordinator.
//!
//! Every operation works on a registry snapshot taken at call time: a client
//! that connects mid-broadcast never sees a partial message, and no lock is
//! held while sends are in flight. Sends are queued on every connection before
//! the call returns; their completions are collected by a background task, so
//! neither a stalled client nor the command path waits on another.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use syncast_core::BroadcastMessage;

use super::report::{BroadcastKind, BroadcastReport, DeliveryOutcome, PendingBroadcast};
use crate::registry::{ConnectionRegistry, DeliveryError};

/// Reasons a broadcast is refused before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    #[error("Refusing to broadcast an empty payload")]
    EmptyPayload,

    #[error("Start time {start_at} is too soon (earliest allowed {earliest})")]
    StartTooSoon { start_at: u64, earliest: u64 },
}

/// Current Unix time in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Sends play/stop messages to, and cancels, every registered connection.
#[derive(Clone)]
pub struct BroadcastCoordinator {
    registry: ConnectionRegistry,
    send_timeout: Duration,
    min_lead: Duration,
}

impl BroadcastCoordinator {
    /// `min_lead` is how far ahead of now a play start time must be.
    pub const fn new(
        registry: ConnectionRegistry,
        send_timeout: Duration,
        min_lead: Duration,
    ) -> Self {
        Self {
            registry,
            send_timeout,
            min_lead,
        }
    }

    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Earliest Unix second a play broadcast may be scheduled for.
    pub fn earliest_start(&self) -> u64 {
        unix_now().saturating_add(self.min_lead.as_secs())
    }

    /// Send `payload` to every client, scheduled to start at Unix second
    /// `start_at`, which must be at least the minimum lead from now.
    pub fn broadcast_play(
        &self,
        payload: Vec<u8>,
        start_at: u64,
    ) -> Result<PendingBroadcast, BroadcastError> {
        if payload.is_empty() {
            return Err(BroadcastError::EmptyPayload);
        }
        let earliest = self.earliest_start();
        if start_at < earliest {
            return Err(BroadcastError::StartTooSoon { start_at, earliest });
        }
        Ok(self.queue_play(payload, start_at))
    }

    /// Send `payload` to every client, scheduled at the earliest allowed start.
    pub fn schedule_play(&self, payload: Vec<u8>) -> Result<PendingBroadcast, BroadcastError> {
        if payload.is_empty() {
            return Err(BroadcastError::EmptyPayload);
        }
        Ok(self.queue_play(payload, self.earliest_start()))
    }

    /// Tell every client to stop playback now.
    pub fn broadcast_stop(&self) -> PendingBroadcast {
        self.fan_out(BroadcastKind::Stop, &BroadcastMessage::stop())
    }

    /// Cancel every registered connection. Returns how many were asked to
    /// close; they leave the registry once their cancellation completes.
    pub fn disconnect_all(&self) -> usize {
        let snapshot = self.registry.snapshot();
        for conn in &snapshot {
            conn.cancel();
        }
        info!(count = snapshot.len(), "Disconnecting all clients");
        snapshot.len()
    }

    fn queue_play(&self, payload: Vec<u8>, start_at: u64) -> PendingBroadcast {
        let kind = BroadcastKind::Play {
            start_at,
            payload_len: payload.len(),
        };
        self.fan_out(kind, &BroadcastMessage::play(start_at, payload))
    }

    fn fan_out(&self, kind: BroadcastKind, message: &BroadcastMessage) -> PendingBroadcast {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            info!(kind = %kind, "No clients connected, nothing sent");
            return PendingBroadcast::noop(kind);
        }

        let frame: Arc<[u8]> = message.encode().into();
        let mut targets = Vec::with_capacity(snapshot.len());
        let mut pending = JoinSet::new();
        for conn in &snapshot {
            let receipt = conn.send(Arc::clone(&frame));
            let connection_id = conn.id();
            let peer = conn.peer();
            targets.push((connection_id, peer));
            let send_timeout = self.send_timeout;
            pending.spawn(async move {
                let result = tokio::time::timeout(send_timeout, receipt.outcome())
                    .await
                    .unwrap_or(Err(DeliveryError::TimedOut));
                DeliveryOutcome {
                    connection_id,
                    peer,
                    result,
                }
            });
        }
        debug!(kind = %kind, clients = targets.len(), "Broadcast queued");

        let collector = tokio::spawn(collect(kind, pending));
        PendingBroadcast::new(kind, targets, collector)
    }
}

/// Wait for every queued send and log the aggregate.
async fn collect(kind: BroadcastKind, mut pending: JoinSet<DeliveryOutcome>) -> BroadcastReport {
    let mut outcomes = Vec::with_capacity(pending.len());
    while let Some(joined) = pending.join_next().await {
        match joined {
            Ok(outcome) => {
                if let Err(e) = &outcome.result {
                    warn!(connection_id = %outcome.connection_id, error = %e, "Delivery failed");
                }
                outcomes.push(outcome);
            }
            Err(e) => warn!(error = %e, "Delivery task did not finish"),
        }
    }

    let report = BroadcastReport::new(kind, outcomes);
    info!(
        kind = %kind,
        attempted = report.attempted(),
        delivered = report.delivered(),
        failed = report.failed(),
        "Broadcast complete"
    );
    report
}
