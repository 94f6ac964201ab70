//! Per-broadcast delivery results.

use std::fmt;
use std::net::SocketAddr;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::registry::{ConnectionId, DeliveryError};

/// What was broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastKind {
    Play { start_at: u64, payload_len: usize },
    Stop,
}

impl fmt::Display for BroadcastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play {
                start_at,
                payload_len,
            } => write!(f, "play({payload_len} bytes @ {start_at})"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

/// Result of delivering one broadcast to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub connection_id: ConnectionId,
    pub peer: Option<SocketAddr>,
    pub result: Result<(), DeliveryError>,
}

impl DeliveryOutcome {
    pub const fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate of every per-connection outcome for one broadcast.
#[derive(Debug, Clone)]
pub struct BroadcastReport {
    kind: BroadcastKind,
    outcomes: Vec<DeliveryOutcome>,
}

impl BroadcastReport {
    pub(crate) const fn new(kind: BroadcastKind, outcomes: Vec<DeliveryOutcome>) -> Self {
        Self { kind, outcomes }
    }

    pub const fn kind(&self) -> BroadcastKind {
        self.kind
    }

    pub fn outcomes(&self) -> &[DeliveryOutcome] {
        &self.outcomes
    }

    /// Number of connections a send was attempted on.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.delivered()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.outcomes.iter().filter(|o| !o.is_delivered())
    }

    /// The registry was empty, so nothing was sent.
    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// A broadcast whose sends are all queued. Outcomes are collected in the
/// background; dropping this does not stop that.
#[derive(Debug)]
pub struct PendingBroadcast {
    kind: BroadcastKind,
    targets: Vec<(ConnectionId, Option<SocketAddr>)>,
    collector: Option<JoinHandle<BroadcastReport>>,
}

impl PendingBroadcast {
    pub(crate) const fn new(
        kind: BroadcastKind,
        targets: Vec<(ConnectionId, Option<SocketAddr>)>,
        collector: JoinHandle<BroadcastReport>,
    ) -> Self {
        Self {
            kind,
            targets,
            collector: Some(collector),
        }
    }

    pub(crate) const fn noop(kind: BroadcastKind) -> Self {
        Self {
            kind,
            targets: Vec::new(),
            collector: None,
        }
    }

    pub const fn kind(&self) -> BroadcastKind {
        self.kind
    }

    /// Number of connections a send was queued on.
    pub fn attempted(&self) -> usize {
        self.targets.len()
    }

    /// The registry was empty, so nothing was sent.
    pub fn is_noop(&self) -> bool {
        self.targets.is_empty()
    }

    /// Wait for every send to complete or time out.
    pub async fn report(self) -> BroadcastReport {
        let Some(collector) = self.collector else {
            return BroadcastReport::new(self.kind, Vec::new());
        };
        match collector.await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Delivery collector did not finish");
                let outcomes = self
                    .targets
                    .into_iter()
                    .map(|(connection_id, peer)| DeliveryOutcome {
                        connection_id,
                        peer,
                        result: Err(DeliveryError::Dropped),
                    })
                    .collect();
                BroadcastReport::new(self.kind, outcomes)
            }
        }
    }
}
