//! Table of live connections.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};

/// Live connections indexed by id, bounded by `max_connections`.
///
/// Mutations take the write lock and are mutually exclusive with scans.
/// Scanners that need to act on entries should take a [`snapshot`] and
/// release the lock first.
///
/// [`snapshot`]: Registry::snapshot
#[derive(Debug)]
pub struct Registry {
    max: usize,
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        Self {
            max: max_connections,
            connections: RwLock::new(HashMap::with_capacity(max_connections)),
        }
    }

    /// Register a connection.
    ///
    /// # Errors
    ///
    /// - `Error::TooManyConnections` when the table is full
    /// - `Error::DuplicateConnection` when the id is already present
    pub fn add(&self, conn: Arc<Connection>) -> Result<()> {
        let mut conns = self.connections.write();
        if conns.len() >= self.max {
            return Err(Error::TooManyConnections(self.max));
        }
        match conns.entry(conn.id()) {
            Entry::Occupied(_) => Err(Error::DuplicateConnection(conn.id())),
            Entry::Vacant(slot) => {
                slot.insert(conn);
                Ok(())
            }
        }
    }

    /// Remove a connection. Only the first of several concurrent callers gets
    /// the entry back; the rest see `None`.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.write().remove(&id)
    }

    #[must_use]
    pub fn find(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(&id).cloned()
    }

    /// Visit every entry under the read lock. `f` must not call back into
    /// the registry.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Connection>)) {
        for conn in self.connections.read().values() {
            f(conn);
        }
    }

    /// Copy of the current entries, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut conns: Vec<_> = self.connections.read().values().cloned().collect();
        conns.sort_by_key(|c| c.id());
        conns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::send_queue::SendQueue;

    fn conn(id: u64) -> Arc<Connection> {
        let id = ConnectionId::new(id);
        let (queue, _rx) = SendQueue::channel(id, 1);
        Arc::new(Connection::new(id, None, 16, queue))
    }

    #[tokio::test]
    async fn test_add_find_remove() {
        let registry = Registry::new(4);
        registry.add(conn(1)).unwrap();
        registry.add(conn(2)).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.find(ConnectionId::new(1)).is_some());

        assert!(registry.remove(ConnectionId::new(1)).is_some());
        assert!(registry.remove(ConnectionId::new(1)).is_none());
        assert!(registry.find(ConnectionId::new(1)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let registry = Registry::new(2);
        registry.add(conn(1)).unwrap();
        registry.add(conn(2)).unwrap();
        assert_eq!(registry.add(conn(3)), Err(Error::TooManyConnections(2)));

        registry.remove(ConnectionId::new(2));
        registry.add(conn(3)).unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let registry = Registry::new(4);
        registry.add(conn(7)).unwrap();
        assert_eq!(
            registry.add(conn(7)),
            Err(Error::DuplicateConnection(ConnectionId::new(7)))
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_ordered_and_detached() {
        let registry = Registry::new(4);
        for id in [3, 1, 2] {
            registry.add(conn(id)).unwrap();
        }
        let snap = registry.snapshot();
        let ids: Vec<u64> = snap.iter().map(|c| c.id().get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        for c in &snap {
            registry.remove(c.id());
        }
        assert!(registry.is_empty());

        let mut seen = 0;
        registry.for_each(|_| seen += 1);
        assert_eq!(seen, 0);
    }

    #[tokio::test]
    async fn test_concurrent_removal_succeeds_once() {
        let registry = Arc::new(Registry::new(4));
        registry.add(conn(5)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.remove(ConnectionId::new(5)).is_some())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
