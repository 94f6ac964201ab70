//! Connection registry: the live set of accepted clients.

mod connection;
mod state;
mod table;

pub use connection::{ClientConnection, ConnectionIo, DeliveryError, OutboundSend, SendReceipt};
pub use state::{ConnectionId, ConnectionState, LifecycleObserver};
pub use table::{ConnectionRegistry, Snapshot};
