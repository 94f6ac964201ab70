//! Fan-out of play/stop/disconnect commands to every registered client.

mod coordinator;
mod report;

pub use coordinator::{BroadcastCoordinator, BroadcastError, unix_now};
pub use report::{BroadcastKind, BroadcastReport, DeliveryOutcome, PendingBroadcast};
