use crate::error::{RegistryError, Result};
use parley_protocol::ClientId;
use std::collections::HashMap;
use tokio::sync::{RwLock, mpsc};

/// Outbound side of a live connection.
///
/// Frames pushed here are drained into the socket by the connection's
/// writer task. Sending never waits for delivery.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ClientId,
    sender: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(id: ClientId, sender: mpsc::UnboundedSender<String>) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn send(&self, text: String) -> Result<()> {
        self.sender
            .send(text)
            .map_err(|_| RegistryError::Disconnected(self.id.clone()))
    }
}

/// Live connections keyed by their assigned id
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ClientId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and queue its greeting frames.
    ///
    /// The greeting is queued while the write lock is held, so nothing
    /// routed to the new id can be delivered ahead of it. An id that is
    /// already taken is rejected and the existing entry is left alone.
    pub async fn insert(&self, handle: ConnectionHandle, greeting: &[String]) -> Result<()> {
        let mut connections = self.connections.write().await;

        if connections.contains_key(handle.id()) {
            return Err(RegistryError::DuplicateId(handle.id().clone()));
        }

        for frame in greeting {
            handle.send(frame.clone())?;
        }

        tracing::debug!("Registered connection {}", handle.id());
        connections.insert(handle.id().clone(), handle);

        Ok(())
    }

    pub async fn lookup(&self, id: &ClientId) -> Result<ConnectionHandle> {
        self.connections
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Queue a frame for `id`. The read lock is held across the send so a
    /// frame is never handed to a connection that has been removed.
    pub async fn send_to(&self, id: &ClientId, text: String) -> Result<()> {
        let connections = self.connections.read().await;

        match connections.get(id) {
            Some(handle) => handle.send(text),
            None => Err(RegistryError::NotFound(id.clone())),
        }
    }

    /// Remove a connection. Removing an unknown id is a no-op.
    pub async fn remove(&self, id: &ClientId) -> bool {
        let removed = self.connections.write().await.remove(id).is_some();

        if removed {
            tracing::debug!("Removed connection {}", id);
        }

        removed
    }

    pub async fn contains(&self, id: &ClientId) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
