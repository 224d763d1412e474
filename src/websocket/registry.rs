use super::connection::{Connection, ConnectionId, UserId};
use dashmap::DashMap;
use std::sync::Arc;

/// Process-local map of user to their most recent connection.
///
/// At most one entry per user. The registry never closes a connection, it only
/// forgets it; closing superseded sockets is up to the protocol handler.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<UserId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for the connection's user, returning the
    /// superseded connection if there was one.
    pub fn register(&self, connection: Connection) -> Option<Connection> {
        let user_id = connection.user_id();
        let connection_id = connection.id();
        let previous = self.connections.insert(user_id, connection);

        match &previous {
            Some(old) => tracing::debug!(
                user_id,
                connection_id = %connection_id,
                superseded = %old.id(),
                "Replaced registry entry"
            ),
            None => tracing::debug!(
                user_id,
                connection_id = %connection_id,
                online = self.connections.len(),
                "Registered connection"
            ),
        }

        previous
    }

    /// Removes the entry only if it still belongs to `connection_id`, so a late
    /// close from a stale socket cannot evict a newer one.
    pub fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(&user_id, |_, current| current.id() == connection_id)
            .is_some();

        if removed {
            tracing::debug!(
                user_id,
                connection_id = %connection_id,
                online = self.connections.len(),
                "Unregistered connection"
            );
        } else {
            tracing::debug!(
                user_id,
                connection_id = %connection_id,
                "Unregister skipped, entry absent or owned by a newer connection"
            );
        }

        removed
    }

    pub fn lookup(&self, user_id: UserId) -> Option<Connection> {
        self.connections.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.connections
            .get(&user_id)
            .map(|entry| entry.value().is_open())
            .unwrap_or(false)
    }

    pub fn online_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connected_user_ids(&self) -> Vec<UserId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Empties the registry and hands back everything it held. Shutdown only.
    pub fn drain(&self) -> Vec<Connection> {
        let user_ids = self.connected_user_ids();
        user_ids
            .into_iter()
            .filter_map(|user_id| self.connections.remove(&user_id).map(|(_, conn)| conn))
            .collect()
    }
}
