//! Handle to one client's network session.
//!
//! A [`ClientConnection`] is split from its transport half, [`ConnectionIo`].
//! The handle is shared (registry, broadcast path); the I/O half is owned by
//! whatever actually moves bytes, normally the per-connection transport task.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::{ConnectionId, ConnectionState, LifecycleObserver};

/// Why a single send to a single connection did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Connection closed before the send was written")]
    Closed,

    #[error("Write failed: {0}")]
    Io(String),

    #[error("Send did not complete in time")]
    TimedOut,

    #[error("Transport dropped the send without reporting")]
    Dropped,
}

/// A queued send waiting for the transport to write it.
pub struct OutboundSend {
    pub bytes: Arc<[u8]>,
    done: oneshot::Sender<Result<(), DeliveryError>>,
}

impl OutboundSend {
    /// Report the outcome back to whoever queued the send.
    pub fn complete(self, result: Result<(), DeliveryError>) {
        // The sender may have stopped waiting (timeout); nothing to do then.
        let _ = self.done.send(result);
    }
}

/// Pending result of one [`ClientConnection::send`].
#[derive(Debug)]
pub struct SendReceipt {
    rx: oneshot::Receiver<Result<(), DeliveryError>>,
}

impl SendReceipt {
    /// Wait for the transport to report the outcome.
    pub async fn outcome(self) -> Result<(), DeliveryError> {
        self.rx.await.unwrap_or(Err(DeliveryError::Dropped))
    }
}

/// Transport-side half of a connection.
pub struct ConnectionIo {
    /// Sends in the order they were queued.
    pub outbound: mpsc::UnboundedReceiver<OutboundSend>,
    /// Triggered when the operator cancels the connection.
    pub cancel: CancellationToken,
}

/// Lifecycle state plus the observers still waiting for the terminal
/// transition. Observers are taken when it fires, so each runs at most once.
struct Lifecycle {
    state: ConnectionState,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

/// Shared handle to one client session.
pub struct ClientConnection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    lifecycle: Mutex<Lifecycle>,
    /// Mirrors `lifecycle.state`, published after observers have run.
    state_tx: watch::Sender<ConnectionState>,
    outbound: mpsc::UnboundedSender<OutboundSend>,
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Create a connection in the `Connecting` state along with its I/O half.
    pub fn new(peer: Option<SocketAddr>) -> (Arc<Self>, ConnectionIo) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);

        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            peer,
            lifecycle: Mutex::new(Lifecycle {
                state: ConnectionState::Connecting,
                observers: Vec::new(),
            }),
            state_tx,
            outbound: outbound_tx,
            cancel: cancel.clone(),
        });
        let io = ConnectionIo {
            outbound: outbound_rx,
            cancel,
        };
        (conn, io)
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    pub const fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Human-readable peer label for logs.
    pub fn peer_label(&self) -> String {
        self.peer
            .map_or_else(|| "unknown".to_string(), |addr| addr.to_string())
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle().state.clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.lifecycle().state.is_terminal()
    }

    /// Watch state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Wait until the connection reaches a terminal state and return it.
    ///
    /// Resolves only after every lifecycle observer has run, so a registry
    /// observed through this no longer contains the connection.
    pub async fn terminated(&self) -> ConnectionState {
        let mut rx = self.subscribe_state();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(ConnectionState::is_terminal).await;
        self.state()
    }

    /// Queue `bytes` for delivery without waiting for the write.
    ///
    /// Sends on one connection are written in the order they are queued.
    pub fn send(&self, bytes: Arc<[u8]>) -> SendReceipt {
        let (done, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(send)) = self.outbound.send(OutboundSend { bytes, done })
        {
            send.complete(Err(DeliveryError::Closed));
        }
        SendReceipt { rx }
    }

    /// Ask the transport to close this connection.
    ///
    /// Returns immediately; completion is observed as a transition to
    /// `Cancelled`.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(connection_id = %self.id, "Cancellation requested");
            self.cancel.cancel();
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to `next` if the transition is legal. Returns whether the state
    /// changed.
    ///
    /// Entering a terminal state runs every installed observer before this
    /// returns and before watchers see the new state.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut lifecycle = self.lifecycle();
        if !lifecycle.state.can_transition_to(&next) {
            return false;
        }
        lifecycle.state = next.clone();

        match &next {
            ConnectionState::Ready => {
                info!(connection_id = %self.id, peer = %self.peer_label(), "Client connected");
            }
            ConnectionState::Failed(reason) => {
                info!(connection_id = %self.id, peer = %self.peer_label(), reason = %reason, "Client connection failed");
            }
            ConnectionState::Cancelled => {
                info!(connection_id = %self.id, peer = %self.peer_label(), "Client disconnected");
            }
            ConnectionState::Connecting => {}
        }

        if next.is_terminal() {
            for observer in std::mem::take(&mut lifecycle.observers) {
                observer.on_terminal(self, &next);
            }
        }
        self.state_tx.send_replace(next);
        drop(lifecycle);
        true
    }

    /// Install an observer for the terminal transition.
    ///
    /// If the connection is already terminal the observer runs immediately.
    pub fn observe(&self, observer: Arc<dyn LifecycleObserver>) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state.is_terminal() {
            observer.on_terminal(self, &lifecycle.state);
        } else {
            lifecycle.observers.push(observer);
        }
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
