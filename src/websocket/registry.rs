//! WebSocket Connection Registry
//!
//! Tracks the outbound channel of every live socket and implements
//! [`MessageBus`] on top of it, so the collaboration hub can address
//! connections by id without touching the sockets themselves.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::session::{BusError, CollabEvent, ConnectionId, MessageBus};

/// Handle for sending messages to a specific connection
pub struct ConnectionHandle {
    /// Channel drained by the connection's send task
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

/// All live WebSocket connections
pub struct ConnectionRegistry {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Register a new WebSocket connection
    ///
    /// Returns the connection ID on success, or an error if the connection
    /// limit has been reached.
    pub fn register(
        &self,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, BusError> {
        let mut connections = self.write()?;
        if connections.len() >= self.max_connections {
            return Err(BusError::TooManyConnections(self.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        connections.insert(id.clone(), ConnectionHandle { sender });

        tracing::info!(connection_id = %id, "WebSocket connected");
        Ok(id)
    }

    /// Forget a connection; its queued messages are dropped
    pub fn unregister(&self, id: &str) {
        match self.connections.write() {
            Ok(mut connections) => {
                connections.remove(id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(id);
            }
        }
        tracing::info!(connection_id = %id, "WebSocket disconnected");
    }

    /// Send a message directly to a specific connection
    pub fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), BusError> {
        let connections = self.read()?;
        let handle = connections
            .get(id)
            .ok_or_else(|| BusError::ConnectionNotFound(id.to_string()))?;

        handle
            .sender
            .send(message)
            .map_err(|_| BusError::SendFailed(id.to_string()))
    }

    /// Get the current connection count
    pub fn connection_count(&self) -> usize {
        self.read().map(|c| c.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<ConnectionId, ConnectionHandle>>, BusError> {
        self.connections
            .read()
            .map_err(|e| BusError::Lock(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ConnectionId, ConnectionHandle>>, BusError> {
        self.connections
            .write()
            .map_err(|e| BusError::Lock(e.to_string()))
    }
}

impl MessageBus for ConnectionRegistry {
    fn send(&self, target: &str, event: CollabEvent) -> Result<(), BusError> {
        self.send_to(target, ServerMessage::Event(event))
    }
}
