//! Registry of open connections.

use super::TransportConnection;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Opaque key of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    /// Numeric id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks connections by handle so they can be looked up and torn down
/// together.
pub struct ConnectionManager {
    connections: DashMap<ConnectionHandle, Arc<dyn TransportConnection>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection.
    pub fn register(&self, connection: Arc<dyn TransportConnection>) -> ConnectionHandle {
        let handle = ConnectionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.insert(handle, connection);
        debug!(%handle, "registered connection");
        handle
    }

    /// Look a connection up.
    #[must_use]
    pub fn get(&self, handle: ConnectionHandle) -> Option<Arc<dyn TransportConnection>> {
        self.connections
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a connection without closing it.
    pub fn deregister(&self, handle: ConnectionHandle) -> Option<Arc<dyn TransportConnection>> {
        let removed = self.connections.remove(&handle).map(|(_, conn)| conn);
        if removed.is_some() {
            debug!(%handle, "deregistered connection");
        }
        removed
    }

    /// Remove and close a connection. Returns `false` for unknown handles.
    pub async fn close(&self, handle: ConnectionHandle) -> bool {
        match self.deregister(handle) {
            Some(conn) => {
                conn.close().await;
                true
            }
            None => false,
        }
    }

    /// Remove and close every connection.
    pub async fn close_all(&self) {
        let handles: Vec<ConnectionHandle> =
            self.connections.iter().map(|entry| *entry.key()).collect();
        for handle in handles {
            self.close(handle).await;
        }
    }

    /// Registered handles.
    #[must_use]
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        let mut handles: Vec<_> = self.connections.iter().map(|entry| *entry.key()).collect();
        handles.sort_unstable();
        handles
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.handles())
            .finish()
    }
}
