//! Registry of open signaling connections
//!
//! Maps connection ids to the outbound message channel of each connection.
//! Registration and removal take the write lock, broadcast iteration the
//! read lock, so the membership a broadcast sees never changes mid-flight.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared set of currently-open relay connections
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection's outbound channel under its id
    pub async fn register(&self, id: Uuid, tx: mpsc::Sender<String>) {
        let mut connections = self.connections.write().await;
        connections.insert(id, tx);
        debug!(connection_id = %id, total = connections.len(), "Connection registered");
    }

    /// Remove a connection, returning whether it was present
    pub async fn unregister(&self, id: &Uuid) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(id).is_some();
        if removed {
            debug!(connection_id = %id, total = connections.len(), "Connection removed");
        }
        removed
    }

    /// Send a message to one connection, returning whether it was queued
    pub async fn send_to(&self, id: &Uuid, message: String) -> bool {
        let connections = self.connections.read().await;
        match connections.get(id) {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Send a message to every connection except the sender
    ///
    /// Best-effort flood: a connection whose outbound queue is gone is
    /// skipped and logged, not treated as a failure. Returns the number of
    /// connections the message was queued for.
    pub async fn broadcast_except(&self, sender: &Uuid, message: String) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (id, tx) in connections.iter() {
            if id == sender {
                continue;
            }
            if tx.send(message.clone()).await.is_ok() {
                delivered += 1;
            } else {
                warn!(connection_id = %id, "Dropping broadcast to closed connection");
            }
        }
        delivered
    }

    /// Number of open connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Ids of all open connections
    pub async fn ids(&self) -> Vec<Uuid> {
        self.connections.read().await.keys().copied().collect()
    }
}
