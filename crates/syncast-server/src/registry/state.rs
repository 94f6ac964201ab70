//! Connection lifecycle states and the observer contract.

use std::fmt;

use uuid::Uuid;

use super::connection::ClientConnection;

/// Unique identity of one accepted client connection.
///
/// Used for equality and removal only; carries no ordering meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a client connection.
///
/// `Connecting -> Ready -> {Failed, Cancelled}`. `Failed` and `Cancelled`
/// are terminal: once entered, no further transition is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Failed(String),
    Cancelled,
}

impl ConnectionState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Failed(_) | Self::Cancelled, _)
            | (Self::Ready, Self::Connecting | Self::Ready)
            | (Self::Connecting, Self::Connecting) => false,
            (Self::Connecting | Self::Ready, _) => true,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Ready => f.write_str("ready"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Notified exactly once when a connection enters a terminal state.
///
/// Runs inline from the transition while the connection's lifecycle is
/// locked: implementations must not block and must not call back into the
/// connection's state accessors. The terminal state is passed in instead.
pub trait LifecycleObserver: Send + Sync {
    fn on_terminal(&self, connection: &ClientConnection, state: &ConnectionState);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_sticky() {
        let failed = ConnectionState::Failed("reset".into());
        for next in [
            ConnectionState::Connecting,
            ConnectionState::Ready,
            ConnectionState::Cancelled,
            ConnectionState::Failed("again".into()),
        ] {
            assert!(!failed.can_transition_to(&next));
            assert!(!ConnectionState::Cancelled.can_transition_to(&next));
        }
    }

    #[test]
    fn forward_transitions_allowed() {
        assert!(ConnectionState::Connecting.can_transition_to(&ConnectionState::Ready));
        assert!(ConnectionState::Connecting.can_transition_to(&ConnectionState::Cancelled));
        assert!(ConnectionState::Ready.can_transition_to(&ConnectionState::Failed("x".into())));
        assert!(!ConnectionState::Ready.can_transition_to(&ConnectionState::Connecting));
    }
}
