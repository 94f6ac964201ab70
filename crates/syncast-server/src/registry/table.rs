//! The live set of client connections.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, info};

use super::connection::ClientConnection;
use super::state::{ConnectionId, ConnectionState, LifecycleObserver};

/// Thread-safe registry of live client connections.
///
/// Structural changes go through [`add`](Self::add) and
/// [`remove`](Self::remove); readers only ever get a [`Snapshot`]. The lock
/// is never held across an await, so lifecycle observers can prune the
/// registry synchronously from inside a state transition.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl RegistryInner {
    fn remove(&self, id: ConnectionId) -> Option<Arc<ClientConnection>> {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            info!(connection_id = %id, "Connection removed from registry");
        } else {
            debug!(connection_id = %id, "Connection already absent from registry");
        }
        removed
    }
}

/// Prunes a connection from the registry when it reaches a terminal state.
struct PruneOnTerminal {
    registry: Weak<RegistryInner>,
}

impl LifecycleObserver for PruneOnTerminal {
    fn on_terminal(&self, connection: &ClientConnection, state: &ConnectionState) {
        debug!(connection_id = %connection.id(), state = %state, "Pruning terminal connection");
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(connection.id());
        }
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and start observing its lifecycle.
    ///
    /// Returns `false` if the connection is already registered. A connection
    /// that is already terminal is pruned before this returns.
    pub fn add(&self, connection: Arc<ClientConnection>) -> bool {
        let id = connection.id();
        {
            let mut connections = self
                .inner
                .connections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if connections.contains_key(&id) {
                debug!(connection_id = %id, "Connection already registered");
                return false;
            }
            connections.insert(id, Arc::clone(&connection));
        }
        info!(connection_id = %id, peer = %connection.peer_label(), "Connection registered");

        connection.observe(Arc::new(PruneOnTerminal {
            registry: Arc::downgrade(&self.inner),
        }));
        true
    }

    /// Remove a connection by identity. Removing an absent connection is a
    /// no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ClientConnection>> {
        self.inner.remove(id)
    }

    /// Point-in-time copy of the registered connections.
    pub fn snapshot(&self) -> Snapshot {
        let connections = self
            .inner
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            connections: connections.values().cloned().collect(),
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable view of the registry at one instant.
///
/// Later additions and removals do not affect an existing snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    connections: Arc<[Arc<ClientConnection>]>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ClientConnection>> {
        self.connections.iter()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|c| c.id()).collect()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Arc<ClientConnection>;
    type IntoIter = std::slice::Iter<'a, Arc<ClientConnection>>;

    fn into_iter(self) -> Self::IntoIter {
        self.connections.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn add_and_snapshot() {
        let registry = ConnectionRegistry::new();
        let (c1, _io1) = ClientConnection::new(None);
        let (c2, _io2) = ClientConnection::new(None);

        assert!(registry.add(Arc::clone(&c1)));
        assert!(registry.add(Arc::clone(&c2)));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        let ids: HashSet<_> = snapshot.ids().into_iter().collect();
        assert!(ids.contains(&c1.id()));
        assert!(ids.contains(&c2.id()));
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let registry = ConnectionRegistry::new();
        let (conn, _io) = ClientConnection::new(None);

        assert!(registry.add(Arc::clone(&conn)));
        assert!(!registry.add(Arc::clone(&conn)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        let (conn, _io) = ClientConnection::new(None);
        registry.add(Arc::clone(&conn));

        assert!(registry.remove(conn.id()).is_some());
        assert!(registry.remove(conn.id()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn terminal_transition_prunes_connection() {
        let registry = ConnectionRegistry::new();
        let (c1, _io1) = ClientConnection::new(None);
        let (c2, _io2) = ClientConnection::new(None);
        registry.add(Arc::clone(&c1));
        registry.add(Arc::clone(&c2));

        let before = registry.snapshot();
        c1.transition(ConnectionState::Ready);
        c1.transition(ConnectionState::Failed("connection reset".into()));

        assert!(!registry.contains(c1.id()));
        assert_eq!(registry.snapshot().ids(), vec![c2.id()]);
        // Snapshots taken earlier are unaffected.
        assert_eq!(before.len(), 2);
    }

    #[test]
    fn non_terminal_transition_keeps_connection() {
        let registry = ConnectionRegistry::new();
        let (conn, _io) = ClientConnection::new(None);
        registry.add(Arc::clone(&conn));

        conn.transition(ConnectionState::Ready);
        assert!(registry.contains(conn.id()));
    }

    #[test]
    fn already_terminal_connection_is_not_kept() {
        let registry = ConnectionRegistry::new();
        let (conn, _io) = ClientConnection::new(None);
        conn.transition(ConnectionState::Cancelled);

        registry.add(Arc::clone(&conn));
        assert!(registry.is_empty());
    }

    #[test]
    fn dropped_registry_does_not_break_transitions() {
        let (conn, _io) = ClientConnection::new(None);
        {
            let registry = ConnectionRegistry::new();
            registry.add(Arc::clone(&conn));
        }
        assert!(conn.transition(ConnectionState::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_are_all_visible() {
        let registry = ConnectionRegistry::new();
        let mut handles = Vec::new();
        let mut keep = Vec::new();

        for _ in 0..64 {
            let (conn, io) = ClientConnection::new(None);
            keep.push((Arc::clone(&conn), io));
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.add(conn) }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let snapshot = registry.snapshot();
        let ids: HashSet<_> = snapshot.ids().into_iter().collect();
        assert_eq!(snapshot.len(), 64);
        assert_eq!(ids.len(), 64);
        for (conn, _) in &keep {
            assert!(ids.contains(&conn.id()));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_terminal_transitions_empty_the_registry() {
        let registry = ConnectionRegistry::new();
        let mut conns = Vec::new();
        for _ in 0..32 {
            let (conn, io) = ClientConnection::new(None);
            registry.add(Arc::clone(&conn));
            conns.push((conn, io));
        }

        let mut handles = Vec::new();
        for (conn, _) in &conns {
            let conn = Arc::clone(conn);
            handles.push(tokio::spawn(async move {
                conn.transition(ConnectionState::Cancelled);
                // Racing a second terminal transition must be harmless.
                conn.transition(ConnectionState::Failed("late".into()));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(registry.is_empty());
    }
}
