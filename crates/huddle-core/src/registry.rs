//! Connection registry.
//!
//! The registry is the authoritative map of live connections. Each entry holds
//! the connection record and the sending half of its outbound event queue, so
//! delivering an event to a connection is a lock-free lookup plus an
//! unbounded channel send.

use crate::connection::{Connection, Membership};
use dashmap::DashMap;
use huddle_protocol::{ConnectionId, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Sending half of a connection's outbound event queue.
pub type Outbound = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Receiving half of a connection's outbound event queue.
pub type Inbox = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

/// Create an outbound queue for a new connection.
#[must_use]
pub fn outbound_queue() -> (Outbound, Inbox) {
    mpsc::unbounded_channel()
}

struct Entry {
    connection: Connection,
    outbound: Outbound,
}

/// Map of live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Entry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Register a connection.
    ///
    /// Returns `false` and leaves the existing entry untouched if the ID is
    /// already registered.
    pub fn register(&self, connection: Connection, outbound: Outbound) -> bool {
        match self.connections.entry(connection.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(connection = %connection.id, identity = %connection.identity, "Registered connection");
                slot.insert(Entry {
                    connection,
                    outbound,
                });
                true
            }
        }
    }

    /// Remove a connection, returning its last state.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Connection> {
        let removed = self
            .connections
            .remove(connection_id)
            .map(|(_, entry)| entry.connection);
        if removed.is_some() {
            debug!(connection = %connection_id, "Unregistered connection");
        }
        removed
    }

    /// Whether a connection is registered.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Snapshot of a connection record.
    #[must_use]
    pub fn lookup(&self, connection_id: &ConnectionId) -> Option<Connection> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.connection.clone())
    }

    /// Mutate a connection record in place.
    ///
    /// Returns `None` if the connection is not registered.
    pub fn update<R>(
        &self,
        connection_id: &ConnectionId,
        f: impl FnOnce(&mut Connection) -> R,
    ) -> Option<R> {
        self.connections
            .get_mut(connection_id)
            .map(|mut entry| f(&mut entry.connection))
    }

    /// Atomically clear a connection's room admission.
    ///
    /// Returns the record as it was before clearing, or `None` if the
    /// connection is unknown or not admitted anywhere. Concurrent callers
    /// racing on the same connection see exactly one `Some`.
    pub fn take_admission(&self, connection_id: &ConnectionId) -> Option<Connection> {
        let mut entry = self.connections.get_mut(connection_id)?;
        if !matches!(entry.connection.membership, Membership::Admitted(_)) {
            return None;
        }
        let before = entry.connection.clone();
        entry.connection.membership = Membership::Idle;
        Some(before)
    }

    /// Snapshot of all connections matching a predicate.
    #[must_use]
    pub fn find(&self, predicate: impl Fn(&Connection) -> bool) -> Vec<Connection> {
        self.connections
            .iter()
            .filter(|entry| predicate(&entry.connection))
            .map(|entry| entry.connection.clone())
            .collect()
    }

    /// Queue an event for a connection.
    ///
    /// Returns `false` if the connection is unknown or its queue is closed.
    pub fn send(&self, connection_id: &ConnectionId, event: Arc<ServerEvent>) -> bool {
        let Some(entry) = self.connections.get(connection_id) else {
            trace!(connection = %connection_id, event = event.name(), "Dropped event for unknown connection");
            return false;
        };
        entry.outbound.send(event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Identity;

    fn conn(id: &str) -> Connection {
        Connection::new(id.into(), Identity::Guest)
    }

    #[test]
    fn test_register_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbound_queue();

        assert!(registry.register(conn("conn-1"), tx.clone()));
        assert!(!registry.register(conn("conn-1"), tx));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(&"conn-1".into()).is_some());
        assert!(registry.unregister(&"conn-1".into()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_send_delivers_to_target_only() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = outbound_queue();
        let (tx2, mut rx2) = outbound_queue();
        registry.register(conn("conn-1"), tx1);
        registry.register(conn("conn-2"), tx2);

        assert!(registry.send(&"conn-1".into(), Arc::new(ServerEvent::error("x"))));
        assert!(!registry.send(&"conn-3".into(), Arc::new(ServerEvent::error("x"))));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_take_admission_is_one_shot() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbound_queue();
        registry.register(conn("conn-1"), tx);

        assert!(registry.take_admission(&"conn-1".into()).is_none());

        registry.update(&"conn-1".into(), |c| {
            c.membership = Membership::Admitted("r1".into());
        });

        let before = registry.take_admission(&"conn-1".into()).unwrap();
        assert_eq!(before.room_id(), Some("r1"));
        assert!(registry.take_admission(&"conn-1".into()).is_none());
        assert_eq!(
            registry.lookup(&"conn-1".into()).unwrap().membership,
            Membership::Idle
        );
    }

    #[test]
    fn test_find_by_predicate() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbound_queue();
        registry.register(conn("conn-1"), tx.clone());
        registry.register(
            Connection::new("conn-2".into(), Identity::user("host")),
            tx,
        );

        let hosts = registry.find(|c| c.identity.is_user("host"));
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id.as_str(), "conn-2");
    }
}
